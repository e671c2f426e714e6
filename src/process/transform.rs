// src/process/transform.rs

use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord};
use serde::Serialize;
use std::{collections::HashSet, fs::File, io::Read, path::Path};
use tracing::{info, instrument, trace};

use crate::config::Dataset;
use crate::error::PipelineError;
use crate::process::{
    date_parser::parse_date,
    numeric::{sanitize_integer, sanitize_numeric, SignConvention},
    record::{Column, ColumnType, Record, RecordSet, Value},
    utils::clean_str,
};

/// Row counters for one transform pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransformSummary {
    pub rows_read: usize,
    /// Removed by dataset value filters.
    pub filtered: usize,
    /// Removed because a null-check column was empty.
    pub dropped_null: usize,
    pub emitted: usize,
}

/// A retained source column and what becomes of it.
struct ColumnPlan<'a> {
    source_idx: usize,
    name: &'a str,
    ty: ColumnType,
    sign: SignConvention,
}

/// Read a truncated CSV from `path` and transform it, see [`transform`].
pub fn transform_file(
    path: &Path,
    dataset: &Dataset,
    loaded_at: NaiveDateTime,
) -> Result<(RecordSet, TransformSummary), PipelineError> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    transform(file, path, dataset, loaded_at)
}

/// Turn header + rows into typed, canonical records.
///
/// Stages run in a fixed order: header check against the schema, drop,
/// rename, value filters, date parsing, numeric sanitization, null-check
/// filtering, load stamp. Any parse or coercion failure aborts the whole
/// source; nothing partial is returned. `origin` only labels errors.
#[instrument(level = "info", skip_all, fields(dataset = %dataset.name(), origin = %origin.display()))]
pub fn transform<R: Read>(
    reader: R,
    origin: &Path,
    dataset: &Dataset,
    loaded_at: NaiveDateTime,
) -> Result<(RecordSet, TransformSummary), PipelineError> {
    let cfg = dataset.config();
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(reader);

    // ─── 1) header vs schema ─────────────────────────────────────────
    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| csv_error(e, origin, &[]))?
        .iter()
        .map(clean_str)
        .collect();
    check_headers(&headers, dataset, origin)?;

    // ─── 2–3) drop + rename, resolved once from the header ────────────
    let mut plan = Vec::with_capacity(headers.len());
    for (idx, header) in headers.iter().enumerate() {
        if dataset.is_dropped(header) {
            continue;
        }
        let name = dataset.canonical_name(header).ok_or_else(|| mismatch(
            origin,
            format!("column `{header}` has no canonical name"),
        ))?;
        let ty = cfg.schema[header];
        plan.push(ColumnPlan {
            source_idx: idx,
            name,
            ty,
            sign: dataset.sign_for(name),
        });
    }

    let position = |name: &str| -> Result<usize, PipelineError> {
        plan.iter()
            .position(|c| c.name == name)
            .ok_or_else(|| mismatch(origin, format!("canonical column `{name}` not produced")))
    };
    let filters = cfg
        .filters
        .iter()
        .map(|f| Ok((position(&f.column)?, f.exclude_equal.as_str())))
        .collect::<Result<Vec<_>, PipelineError>>()?;
    let null_check = cfg
        .null_check
        .iter()
        .map(|c| position(c))
        .collect::<Result<Vec<_>, _>>()?;
    let key = cfg
        .primary_key
        .iter()
        .map(|c| position(c))
        .collect::<Result<Vec<_>, _>>()?;
    let date_format = cfg.date_format.as_deref().unwrap_or_default();

    let mut columns: Vec<Column> = plan
        .iter()
        .map(|c| Column {
            name: c.name.to_string(),
            ty: c.ty,
        })
        .collect();
    if let Some(stamp) = &cfg.load_timestamp_column {
        columns.push(Column {
            name: stamp.clone(),
            ty: ColumnType::Timestamp,
        });
    }

    let mut out = RecordSet::new(columns);
    let mut summary = TransformSummary::default();
    let mut row = StringRecord::new();

    loop {
        match rdr.read_record(&mut row) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => return Err(csv_error(e, origin, &headers)),
        }
        let line = row.position().map(|p| p.line()).unwrap_or_default();
        summary.rows_read += 1;

        let raw: Vec<String> = plan
            .iter()
            .map(|c| clean_str(row.get(c.source_idx).unwrap_or_default()))
            .collect();

        // ─── 4) value filters on raw text ───────────────────────────
        if filters.iter().any(|(i, literal)| raw[*i] == *literal) {
            trace!(line, "row excluded by value filter");
            summary.filtered += 1;
            continue;
        }

        let mut values: Vec<Value> = raw
            .into_iter()
            .map(|s| if s.is_empty() { Value::Null } else { Value::Text(s) })
            .collect();

        // ─── 5) dates ───────────────────────────────────────────────
        for (value, col) in values.iter_mut().zip(&plan) {
            if col.ty != ColumnType::Date {
                continue;
            }
            if let Value::Text(s) = value {
                let date = parse_date(s, date_format)
                    .map_err(|e| coercion(line, col.name, s, e.to_string()))?;
                *value = Value::Date(date);
            }
        }

        // ─── 6) numerics ────────────────────────────────────────────
        for (value, col) in values.iter_mut().zip(&plan) {
            if let Value::Text(s) = value {
                match col.ty {
                    ColumnType::Numeric => {
                        let canonical = sanitize_numeric(s, col.sign)
                            .map_err(|e| coercion(line, col.name, s, e.to_string()))?;
                        *value = Value::Numeric(canonical);
                    }
                    ColumnType::Integer => {
                        let n = sanitize_integer(s, col.sign)
                            .map_err(|e| coercion(line, col.name, s, e.to_string()))?;
                        *value = Value::Integer(n);
                    }
                    _ => {}
                }
            }
        }

        // ─── 7) null-check ──────────────────────────────────────────
        if null_check.iter().any(|i| values[*i].is_null()) {
            trace!(line, "row dropped by null-check");
            summary.dropped_null += 1;
            continue;
        }
        if let Some(i) = key.iter().find(|i| values[**i].is_null()) {
            return Err(PipelineError::ConstraintViolation(format!(
                "{} line {line}: primary key column `{}` is empty",
                origin.display(),
                plan[*i].name
            )));
        }

        // ─── 8) load stamp ──────────────────────────────────────────
        if cfg.load_timestamp_column.is_some() {
            values.push(Value::Timestamp(loaded_at));
        }

        out.records.push(Record { line, values });
    }

    summary.emitted = out.len();
    info!(
        rows_read = summary.rows_read,
        filtered = summary.filtered,
        dropped_null = summary.dropped_null,
        emitted = summary.emitted,
        "transform complete"
    );
    Ok((out, summary))
}

fn check_headers(headers: &[String], dataset: &Dataset, origin: &Path) -> Result<(), PipelineError> {
    if headers.iter().all(|h| h.is_empty()) {
        return Err(mismatch(origin, "no header row"));
    }

    let mut seen = HashSet::new();
    for h in headers {
        if !seen.insert(h.as_str()) {
            return Err(mismatch(origin, format!("header repeats column `{h}`")));
        }
    }

    let schema = &dataset.config().schema;
    let missing: Vec<&str> = schema
        .keys()
        .filter(|k| !seen.contains(k.as_str()))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(mismatch(
            origin,
            format!("declared columns absent from header: {}", missing.join(", ")),
        ));
    }

    let unexpected: Vec<&str> = headers
        .iter()
        .filter(|h| !schema.contains_key(*h))
        .map(String::as_str)
        .collect();
    if !unexpected.is_empty() {
        return Err(mismatch(
            origin,
            format!("header has undeclared columns: {}", unexpected.join(", ")),
        ));
    }
    Ok(())
}

fn mismatch(origin: &Path, detail: impl Into<String>) -> PipelineError {
    PipelineError::SchemaMismatch {
        context: origin.display().to_string(),
        detail: detail.into(),
    }
}

fn coercion(line: u64, column: &str, value: &str, reason: String) -> PipelineError {
    PipelineError::Coercion {
        line,
        column: column.to_string(),
        value: value.to_string(),
        reason,
    }
}

fn csv_error(err: csv::Error, origin: &Path, headers: &[String]) -> PipelineError {
    let line = err.position().map(|p| p.line()).unwrap_or_default();
    match err.into_kind() {
        csv::ErrorKind::Io(e) => PipelineError::io(origin, e),
        csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => PipelineError::SchemaMismatch {
            context: format!("{} line {line}", origin.display()),
            detail: format!("row has {len} fields, header has {expected_len}"),
        },
        csv::ErrorKind::Utf8 { err, .. } => PipelineError::Coercion {
            line,
            column: headers.get(err.field()).cloned().unwrap_or_default(),
            value: String::new(),
            reason: "invalid UTF-8".into(),
        },
        other => PipelineError::SchemaMismatch {
            context: format!("{} line {line}", origin.display()),
            detail: format!("{other:?}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use anyhow::Result;
    use chrono::NaiveDate;
    use std::io::Cursor;

    const CONFIG: &str = r#"
datasets:
  - name: well_depth
    source: "in/Well*.csv"
    staging: staging/well.csv
    sentinel: Delivery
    date_format: "%m/%d/%Y"
    schema:
      Pool1: text
      Project1: text
      FacilityName1: text
      Textbox56: date
      Textbox57: numeric
    drop: [Pool1, Project1]
    rename:
      FacilityName1: well_id
      Textbox56: reading_date
      Textbox57: measurement
    null_check: [measurement]
    primary_key: [well_id, reading_date]
    update_columns: [measurement]
    target: { warehouse: metro, namespace: telemetry, table: well_depth }
  - name: production
    source: "in/Production*.csv"
    staging: staging/production.csv
    date_format: "%m/%d/%Y"
    schema: { Meter: text, Month: date, Volume: numeric, Wells: integer }
    rename: { Meter: meter_id, Month: reading_month, Volume: volume, Wells: wells }
    filters:
      - { column: volume, exclude_equal: "0" }
    sign_convention: strip
    primary_key: [meter_id, reading_month]
    update_columns: [volume, wells]
    load_timestamp_column: loaded_at
    target: { warehouse: metro, namespace: telemetry, table: production }
"#;

    fn dataset(name: &str) -> Dataset {
        RunConfig::from_yaml_str(CONFIG)
            .unwrap()
            .dataset(name)
            .unwrap()
            .clone()
    }

    fn loaded_at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 2, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn run(csv: &str, name: &str) -> Result<(RecordSet, TransformSummary), PipelineError> {
        transform(
            Cursor::new(csv.as_bytes().to_vec()),
            Path::new("well.csv"),
            &dataset(name),
            loaded_at(),
        )
    }

    fn date(y: i32, m: u32, d: u32) -> Value {
        Value::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn drops_renames_and_coerces() -> Result<()> {
        let csv = "Pool1,Project1,FacilityName1,Textbox56,Textbox57\n\
                   P,X,W1,01/01/2024,\"1,234.5\"\n\
                   P,X,W2,01/02/2024,-3\n\
                   P,X,W3,01/03/2024,\n";
        let (set, summary) = run(csv, "well_depth")?;

        let names: Vec<&str> = set.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["well_id", "reading_date", "measurement"]);
        assert_eq!(
            summary,
            TransformSummary {
                rows_read: 3,
                filtered: 0,
                dropped_null: 1,
                emitted: 2
            }
        );
        assert_eq!(
            set.records[0].values,
            vec![
                Value::Text("W1".into()),
                date(2024, 1, 1),
                Value::Numeric("1234.5".into())
            ]
        );
        assert_eq!(set.records[1].values[2], Value::Numeric("-3".into()));
        assert_eq!(set.records[1].line, 3);
        Ok(())
    }

    #[test]
    fn null_check_columns_never_empty() -> Result<()> {
        let csv = "Pool1,Project1,FacilityName1,Textbox56,Textbox57\n\
                   ,,W1,01/01/2024,\n\
                   ,,W2,01/02/2024,  \n\
                   ,,W3,01/03/2024,\"\"\n\
                   ,,W4,01/04/2024,7\n";
        let (set, summary) = run(csv, "well_depth")?;
        assert_eq!(summary.dropped_null, 3);
        for rec in &set.records {
            assert!(!set.get(rec, "measurement").unwrap().is_null());
        }
        Ok(())
    }

    #[test]
    fn missing_declared_column_is_schema_mismatch() {
        let csv = "Pool1,Project1,FacilityName1,Textbox56\nP,X,W1,01/01/2024\n";
        let err = run(csv, "well_depth").unwrap_err();
        assert_eq!(err.code(), "SchemaMismatchError");
        assert!(err.to_string().contains("Textbox57"));
    }

    #[test]
    fn undeclared_column_is_schema_mismatch() {
        let csv = "Pool1,Project1,FacilityName1,Textbox56,Textbox57,Extra\nP,X,W1,01/01/2024,1,e\n";
        let err = run(csv, "well_depth").unwrap_err();
        assert!(err.to_string().contains("Extra"));
    }

    #[test]
    fn ragged_row_is_schema_mismatch() {
        let csv = "Pool1,Project1,FacilityName1,Textbox56,Textbox57\nP,X,W1,01/01/2024,1,extra\n";
        let err = run(csv, "well_depth").unwrap_err();
        assert_eq!(err.code(), "SchemaMismatchError");
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn empty_input_is_schema_mismatch() {
        let err = run("", "well_depth").unwrap_err();
        assert_eq!(err.code(), "SchemaMismatchError");
    }

    #[test]
    fn bad_date_aborts_with_coercion_error() {
        let csv = "Pool1,Project1,FacilityName1,Textbox56,Textbox57\n\
                   P,X,W1,01/01/2024,1\n\
                   P,X,W2,13/45/2024,2\n";
        match run(csv, "well_depth").unwrap_err() {
            PipelineError::Coercion {
                line,
                column,
                value,
                ..
            } => {
                assert_eq!(line, 3);
                assert_eq!(column, "reading_date");
                assert_eq!(value, "13/45/2024");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bad_numeric_aborts_with_coercion_error() {
        let csv = "Pool1,Project1,FacilityName1,Textbox56,Textbox57\nP,X,W1,01/01/2024,n/a\n";
        let err = run(csv, "well_depth").unwrap_err();
        assert_eq!(err.code(), "CoercionError");
        assert!(err.to_string().contains("measurement"));
    }

    #[test]
    fn empty_primary_key_is_constraint_violation() {
        let csv = "Pool1,Project1,FacilityName1,Textbox56,Textbox57\nP,X,,01/01/2024,4\n";
        let err = run(csv, "well_depth").unwrap_err();
        assert_eq!(err.code(), "ConstraintViolation");
        assert!(err.to_string().contains("well_id"));
    }

    #[test]
    fn zero_filter_strip_sign_and_load_stamp() -> Result<()> {
        let csv = "Meter,Month,Volume,Wells\n\
                   M1,01/01/2024,0,2\n\
                   M2,01/01/2024,\"1,500-\",3\n\
                   M3,01/01/2024,0.0,1\n";
        let (set, summary) = run(csv, "production")?;

        assert_eq!(summary.filtered, 1);
        assert_eq!(set.len(), 2);
        assert_eq!(set.columns.last().unwrap().name, "loaded_at");
        assert_eq!(set.columns.last().unwrap().ty, ColumnType::Timestamp);

        let m2 = &set.records[0];
        assert_eq!(set.get(m2, "volume"), Some(&Value::Numeric("1500".into())));
        assert_eq!(set.get(m2, "wells"), Some(&Value::Integer(3)));
        assert_eq!(set.get(m2, "loaded_at"), Some(&Value::Timestamp(loaded_at())));
        // only the exact literal is filtered
        assert_eq!(
            set.get(&set.records[1], "volume"),
            Some(&Value::Numeric("0.0".into()))
        );
        Ok(())
    }
}
