// src/config/types.rs

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, path::PathBuf};

use crate::duck::LoadOptions;
use crate::process::{ColumnType, SignConvention};

/// Top-level configuration document, as written in YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,
    #[serde(default)]
    pub load: LoadOptions,
    pub datasets: Vec<DatasetConfig>,
}

/// One dataset type: where its files live, how to read them, where they load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetConfig {
    pub name: String,
    /// Glob pattern for input discovery.
    pub source: String,
    /// Truncated copy the transformer reads; archived after a successful load.
    pub staging: PathBuf,
    #[serde(default)]
    pub sentinel: Option<String>,
    #[serde(default)]
    pub date_format: Option<String>,
    /// Source column → declared type.
    pub schema: BTreeMap<String, ColumnType>,
    #[serde(default)]
    pub drop: Vec<String>,
    /// Source column → canonical column.
    pub rename: BTreeMap<String, String>,
    #[serde(default)]
    pub null_check: Vec<String>,
    #[serde(default)]
    pub filters: Vec<ValueFilter>,
    #[serde(default)]
    pub sign_convention: SignConvention,
    /// Canonical numeric column → convention, overriding `sign_convention`.
    #[serde(default)]
    pub sign_overrides: BTreeMap<String, SignConvention>,
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub update_columns: Vec<String>,
    #[serde(default = "default_modified_column")]
    pub modified_column: String,
    #[serde(default)]
    pub load_timestamp_column: Option<String>,
    pub target: TargetRelation,
}

/// Discard rows whose (trimmed, raw) value in `column` equals `exclude_equal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValueFilter {
    pub column: String,
    pub exclude_equal: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetRelation {
    pub warehouse: String,
    pub namespace: String,
    pub table: String,
}

impl fmt::Display for TargetRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.warehouse, self.namespace, self.table)
    }
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("archive")
}

fn default_modified_column() -> String {
    "updated_at".to_string()
}
