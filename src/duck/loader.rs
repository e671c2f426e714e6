// src/duck/loader.rs

use chrono::NaiveDateTime;
use duckdb::{params, params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error, info, instrument};

use super::{quote_ident, Connector, UpsertStatement};
use crate::config::{Dataset, TargetRelation};
use crate::error::PipelineError;
use crate::process::{normalize_decimal, Record, RecordSet, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// One transaction per file: every row lands or none does.
    #[default]
    Transaction,
    /// Each statement commits on its own; a failure leaves earlier batches in place.
    Autocommit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadOptions {
    pub commit_mode: CommitMode,
    /// Rows per `INSERT` statement.
    pub batch_size: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            commit_mode: CommitMode::Transaction,
            batch_size: 500,
        }
    }
}

/// Loader lifecycle. `Closed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderState {
    Disconnected,
    Connected,
    TableVerified,
    Loading,
    Closed,
    Failed,
}

impl LoaderState {
    fn can_enter(self, next: LoaderState) -> bool {
        use LoaderState::*;
        matches!(
            (self, next),
            (Disconnected, Connected)
                | (Disconnected, Failed)
                | (Connected, TableVerified)
                | (Connected, Failed)
                | (TableVerified, Loading)
                | (Loading, Closed)
                | (Loading, Failed)
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub rows_written: usize,
    pub statements: usize,
}

/// Upserts one [`RecordSet`] into one relation. Owns its warehouse
/// connection for the duration of a single load; a loader is single-use.
pub struct UpsertLoader<'a> {
    target: &'a TargetRelation,
    primary_key: &'a [String],
    update_columns: &'a [String],
    modified_column: &'a str,
    options: LoadOptions,
    state: LoaderState,
    conn: Option<Connection>,
}

impl<'a> UpsertLoader<'a> {
    pub fn new(
        target: &'a TargetRelation,
        primary_key: &'a [String],
        update_columns: &'a [String],
        modified_column: &'a str,
        options: LoadOptions,
    ) -> Self {
        Self {
            target,
            primary_key,
            update_columns,
            modified_column,
            options,
            state: LoaderState::Disconnected,
            conn: None,
        }
    }

    pub fn for_dataset(dataset: &'a Dataset, options: LoadOptions) -> Self {
        let cfg = dataset.config();
        Self::new(
            &cfg.target,
            &cfg.primary_key,
            &cfg.update_columns,
            &cfg.modified_column,
            options,
        )
    }

    pub fn state(&self) -> LoaderState {
        self.state
    }

    /// Check keys, connect, verify the relation, then upsert every record,
    /// stamping `modified_at` into the modification column.
    ///
    /// On error the connection is closed and the error says how many rows
    /// were committed (see [`PipelineError::committed`]).
    #[instrument(level = "info", skip_all, fields(target = %self.target, rows = records.len()))]
    pub fn load(
        &mut self,
        connector: &Connector,
        records: &RecordSet,
        modified_at: NaiveDateTime,
    ) -> Result<LoadSummary, PipelineError> {
        if self.state != LoaderState::Disconnected {
            return Err(PipelineError::Connection {
                detail: format!("loader already used (state {:?})", self.state),
                source: None,
            });
        }
        check_batch_keys(records, self.primary_key)?;

        match connector.connect(&self.target.warehouse) {
            Ok(conn) => self.conn = Some(conn),
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        }
        self.advance(LoaderState::Connected);

        let relation_types = match self.verify_relation(records) {
            Ok(types) => types,
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };
        self.advance(LoaderState::TableVerified);

        self.advance(LoaderState::Loading);
        match self.write(records, &relation_types, modified_at) {
            Ok(summary) => {
                self.close();
                info!(
                    rows = summary.rows_written,
                    statements = summary.statements,
                    "load complete"
                );
                Ok(summary)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    fn advance(&mut self, next: LoaderState) {
        debug_assert!(
            self.state.can_enter(next),
            "invalid loader transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(from = ?self.state, to = ?next, "loader state");
        self.state = next;
    }

    fn close(&mut self) {
        drop(self.conn.take());
        self.advance(LoaderState::Closed);
    }

    fn fail(&mut self, err: &PipelineError) {
        error!(code = err.code(), committed = err.committed(), "load failed: {}", err);
        drop(self.conn.take());
        self.advance(LoaderState::Failed);
    }

    fn connection(&self) -> Result<&Connection, PipelineError> {
        self.conn.as_ref().ok_or_else(|| PipelineError::Connection {
            detail: "not connected".into(),
            source: None,
        })
    }

    /// Relation must exist and carry every column we are about to write.
    /// Ends with a bounded read probe. Returns lowercased column name →
    /// declared SQL type.
    fn verify_relation(
        &self,
        records: &RecordSet,
    ) -> Result<HashMap<String, String>, PipelineError> {
        let conn = self.connection()?;
        let ns = self.target.namespace.as_str();
        let table = self.target.table.as_str();

        let found: i64 = conn
            .query_row(
                "SELECT count(*) FROM information_schema.tables \
                 WHERE table_catalog = current_database() \
                 AND lower(table_schema) = lower(?) AND lower(table_name) = lower(?)",
                params![ns, table],
                |r| r.get(0),
            )
            .map_err(|e| PipelineError::connection("looking up relation", e))?;
        if found == 0 {
            return Err(PipelineError::RelationNotFound {
                relation: self.target.to_string(),
            });
        }

        let existing: HashMap<String, String> = {
            let mut stmt = conn
                .prepare(
                    "SELECT column_name, data_type FROM information_schema.columns \
                     WHERE table_catalog = current_database() \
                     AND lower(table_schema) = lower(?) AND lower(table_name) = lower(?)",
                )
                .map_err(|e| PipelineError::connection("reading relation columns", e))?;
            let columns = stmt
                .query_map(params![ns, table], |r| {
                    Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
                })
                .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
                .map_err(|e| PipelineError::connection("reading relation columns", e))?;
            columns
                .into_iter()
                .map(|(name, ty)| (name.to_lowercase(), ty))
                .collect()
        };
        let missing: Vec<&str> = records
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .chain(std::iter::once(self.modified_column))
            .filter(|c| !existing.contains_key(&c.to_lowercase()))
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::SchemaMismatch {
                context: self.target.to_string(),
                detail: format!("relation lacks columns: {}", missing.join(", ")),
            });
        }

        let probe = format!(
            "SELECT 1 FROM {}.{} LIMIT 1",
            quote_ident(ns),
            quote_ident(table)
        );
        let mut stmt = conn
            .prepare(&probe)
            .map_err(|e| PipelineError::connection("probing relation", e))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| PipelineError::connection("probing relation", e))?;
        rows.next()
            .map_err(|e| PipelineError::connection("probing relation", e))?;

        debug!(relation = %self.target, "relation verified");
        Ok(existing)
    }

    fn write(
        &mut self,
        records: &RecordSet,
        relation_types: &HashMap<String, String>,
        modified_at: NaiveDateTime,
    ) -> Result<LoadSummary, PipelineError> {
        let statement = UpsertStatement::new(
            self.target,
            &records.columns,
            relation_types,
            self.primary_key,
            self.update_columns,
            self.modified_column,
        );
        let batch_size = self.options.batch_size.max(1);
        let stamp = Value::Timestamp(modified_at).to_param();
        let mode = self.options.commit_mode;

        let conn = self.conn.as_mut().ok_or_else(|| PipelineError::Connection {
            detail: "not connected".into(),
            source: None,
        })?;
        match mode {
            CommitMode::Transaction => {
                write_in_transaction(conn, &statement, &records.records, batch_size, &stamp)
            }
            CommitMode::Autocommit => {
                write_autocommit(conn, &statement, &records.records, batch_size, &stamp)
            }
        }
    }
}

fn write_in_transaction(
    conn: &mut Connection,
    statement: &UpsertStatement,
    records: &[Record],
    batch_size: usize,
    stamp: &Option<String>,
) -> Result<LoadSummary, PipelineError> {
    let total = records.len();
    let tx = conn
        .transaction()
        .map_err(|e| PipelineError::connection("beginning transaction", e))?;

    let mut summary = LoadSummary::default();
    for batch in records.chunks(batch_size) {
        // dropping `tx` on the error path rolls everything back
        execute_batch(&tx, statement, batch, stamp).map_err(|source| {
            error!(line = batch[0].line, "upsert failed, rolling back");
            PipelineError::StatementExecution {
                abandoned: total,
                source,
            }
        })?;
        summary.statements += 1;
    }
    tx.commit().map_err(|source| PipelineError::StatementExecution {
        abandoned: total,
        source,
    })?;

    summary.rows_written = total;
    Ok(summary)
}

fn write_autocommit(
    conn: &Connection,
    statement: &UpsertStatement,
    records: &[Record],
    batch_size: usize,
    stamp: &Option<String>,
) -> Result<LoadSummary, PipelineError> {
    let total = records.len();
    let mut summary = LoadSummary::default();

    for batch in records.chunks(batch_size) {
        if let Err(source) = execute_batch(conn, statement, batch, stamp) {
            let committed = summary.rows_written;
            let abandoned = total - committed;
            error!(line = batch[0].line, committed, abandoned, "upsert failed");
            let err = PipelineError::StatementExecution { abandoned, source };
            return Err(if committed > 0 {
                PipelineError::PartialLoadFailure {
                    committed,
                    abandoned,
                    source: Box::new(err),
                }
            } else {
                err
            });
        }
        summary.rows_written += batch.len();
        summary.statements += 1;
    }
    Ok(summary)
}

fn execute_batch(
    conn: &Connection,
    statement: &UpsertStatement,
    batch: &[Record],
    stamp: &Option<String>,
) -> duckdb::Result<usize> {
    let sql = statement.sql(batch.len());
    let mut stmt = conn.prepare_cached(&sql)?;
    let params = batch.iter().flat_map(|r| {
        r.values
            .iter()
            .map(Value::to_param)
            .chain(std::iter::once(stamp.clone()))
    });
    stmt.execute(params_from_iter(params))
}

/// Every key column must be set and no key may repeat within the batch;
/// a repeated key would make the outcome depend on statement order.
/// Numeric parts compare by value, since `1.0` and `1` land as one key.
fn check_batch_keys(records: &RecordSet, primary_key: &[String]) -> Result<(), PipelineError> {
    let idx = primary_key
        .iter()
        .map(|k| {
            records.column_index(k).ok_or_else(|| PipelineError::SchemaMismatch {
                context: "record set".into(),
                detail: format!("primary key column `{k}` is not produced"),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut seen: HashMap<Vec<String>, u64> = HashMap::with_capacity(records.len());
    for rec in &records.records {
        let key = idx
            .iter()
            .map(|i| rec.values.get(*i).and_then(key_part))
            .collect::<Option<Vec<String>>>()
            .ok_or_else(|| {
                PipelineError::ConstraintViolation(format!(
                    "line {}: primary key has an empty column",
                    rec.line
                ))
            })?;
        let shown = key.join("/");
        if let Some(first) = seen.insert(key, rec.line) {
            return Err(PipelineError::ConstraintViolation(format!(
                "duplicate primary key {shown} at lines {first} and {}",
                rec.line
            )));
        }
    }
    Ok(())
}

fn key_part(value: &Value) -> Option<String> {
    match value {
        Value::Numeric(s) => Some(normalize_decimal(s)),
        other => other.to_param(),
    }
}
