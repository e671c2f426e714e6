// src/config/validate.rs

use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    fmt::Display,
};

use super::types::DatasetConfig;
use crate::error::PipelineError;
use crate::process::{ColumnType, SignConvention};

/// A dataset definition that passed [`DatasetConfig::validate`]. Only
/// obtainable through validation, so every consumer can rely on the
/// cross-references between schema, mapping, key and update columns.
#[derive(Debug, Clone)]
pub struct Dataset {
    config: DatasetConfig,
    /// canonical column → declared type, retained columns only
    canonical: BTreeMap<String, ColumnType>,
}

impl Dataset {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn canonical_type(&self, column: &str) -> Option<ColumnType> {
        self.canonical.get(column).copied()
    }

    pub fn canonical_columns(&self) -> impl Iterator<Item = (&str, ColumnType)> {
        self.canonical.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_dropped(&self, source: &str) -> bool {
        self.config.drop.iter().any(|d| d == source)
    }

    pub fn canonical_name(&self, source: &str) -> Option<&str> {
        self.config.rename.get(source).map(String::as_str)
    }

    pub fn sign_for(&self, column: &str) -> SignConvention {
        self.config
            .sign_overrides
            .get(column)
            .copied()
            .unwrap_or(self.config.sign_convention)
    }
}

fn reject(dataset: &str, msg: impl Display) -> PipelineError {
    PipelineError::Config(format!("dataset `{dataset}`: {msg}"))
}

fn check_unique<'a>(
    dataset: &str,
    what: &str,
    names: impl IntoIterator<Item = &'a String>,
) -> Result<(), PipelineError> {
    let mut seen = HashSet::new();
    for n in names {
        if !seen.insert(n.as_str()) {
            return Err(reject(dataset, format!("{what} lists `{n}` twice")));
        }
    }
    Ok(())
}

impl DatasetConfig {
    /// Check every cross-reference once, before any file is touched.
    pub fn validate(self) -> Result<Dataset, PipelineError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(PipelineError::Config("dataset with empty name".into()));
        }
        if self.source.trim().is_empty() {
            return Err(reject(name, "empty source pattern"));
        }
        if self.staging.as_os_str().is_empty() {
            return Err(reject(name, "empty staging path"));
        }
        if matches!(self.sentinel.as_deref(), Some(s) if s.is_empty()) {
            return Err(reject(name, "sentinel must not be empty"));
        }

        // ─── schema / drop / rename ─────────────────────────────────────
        if self.schema.is_empty() {
            return Err(reject(name, "schema declares no columns"));
        }
        for (col, ty) in &self.schema {
            if col.trim().is_empty() {
                return Err(reject(name, "schema has an empty column name"));
            }
            if *ty == ColumnType::Timestamp {
                return Err(reject(
                    name,
                    format!("column `{col}`: timestamp is reserved for load_timestamp_column"),
                ));
            }
        }
        for col in &self.drop {
            if !self.schema.contains_key(col) {
                return Err(reject(name, format!("drop column `{col}` is not in schema")));
            }
        }
        let dropped: BTreeSet<&str> = self.drop.iter().map(String::as_str).collect();
        for source in self.rename.keys() {
            if !self.schema.contains_key(source) {
                return Err(reject(name, format!("rename source `{source}` is not in schema")));
            }
            if dropped.contains(source.as_str()) {
                return Err(reject(name, format!("`{source}` is both dropped and renamed")));
            }
        }

        let mut canonical = BTreeMap::new();
        for (source, ty) in &self.schema {
            if dropped.contains(source.as_str()) {
                continue;
            }
            let target = self.rename.get(source).ok_or_else(|| {
                reject(name, format!("retained column `{source}` has no rename entry"))
            })?;
            if target.trim().is_empty() {
                return Err(reject(name, format!("`{source}` renames to an empty name")));
            }
            if canonical.insert(target.clone(), *ty).is_some() {
                return Err(reject(
                    name,
                    format!("two source columns map to `{target}`"),
                ));
            }
        }

        // ─── canonical references ───────────────────────────────────────
        let require = |what: &str, col: &str| -> Result<(), PipelineError> {
            if canonical.contains_key(col) {
                Ok(())
            } else {
                Err(reject(name, format!("{what} column `{col}` is not a canonical column")))
            }
        };
        for col in &self.null_check {
            require("null_check", col)?;
        }
        for f in &self.filters {
            require("filter", &f.column)?;
        }

        if self.primary_key.is_empty() {
            return Err(reject(name, "primary_key is empty"));
        }
        check_unique(name, "primary_key", &self.primary_key)?;
        for col in &self.primary_key {
            require("primary_key", col)?;
        }
        check_unique(name, "update_columns", &self.update_columns)?;
        for col in &self.update_columns {
            require("update_columns", col)?;
            if self.primary_key.contains(col) {
                return Err(reject(
                    name,
                    format!("update column `{col}` is part of the primary key"),
                ));
            }
        }

        if self.modified_column.trim().is_empty() {
            return Err(reject(name, "modified_column is empty"));
        }
        if canonical.contains_key(&self.modified_column) {
            return Err(reject(
                name,
                format!("modified_column `{}` collides with a canonical column", self.modified_column),
            ));
        }
        if let Some(stamp) = &self.load_timestamp_column {
            if stamp.trim().is_empty() {
                return Err(reject(name, "load_timestamp_column is empty"));
            }
            if canonical.contains_key(stamp) || *stamp == self.modified_column {
                return Err(reject(
                    name,
                    format!("load_timestamp_column `{stamp}` collides with another column"),
                ));
            }
        }

        for col in self.sign_overrides.keys() {
            match canonical.get(col) {
                Some(ty) if ty.is_numeric() => {}
                Some(_) => {
                    return Err(reject(name, format!("sign override on non-numeric column `{col}`")))
                }
                None => require("sign_overrides", col)?,
            }
        }

        if canonical.values().any(|t| *t == ColumnType::Date) && self.date_format.is_none() {
            return Err(reject(name, "date columns declared but no date_format"));
        }

        let t = &self.target;
        if [&t.warehouse, &t.namespace, &t.table]
            .iter()
            .any(|s| s.trim().is_empty())
        {
            return Err(reject(name, "target warehouse, namespace and table must be set"));
        }

        Ok(Dataset {
            config: self,
            canonical,
        })
    }
}
