// src/error.rs

use std::{io, path::PathBuf};
use thiserror::Error;

/// Every way a dataset run can fail. Each variant carries a stable code
/// (see [`PipelineError::code`]) that ends up in the per-dataset outcome.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("schema mismatch in {context}: {detail}")]
    SchemaMismatch { context: String, detail: String },

    #[error("cannot coerce {value:?} in column `{column}` at line {line}: {reason}")]
    Coercion {
        line: u64,
        column: String,
        value: String,
        reason: String,
    },

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("relation {relation} not found")]
    RelationNotFound { relation: String },

    #[error("warehouse connection error: {detail}")]
    Connection {
        detail: String,
        #[source]
        source: Option<duckdb::Error>,
    },

    #[error("statement failed, {abandoned} rows abandoned: {source}")]
    StatementExecution {
        abandoned: usize,
        #[source]
        source: duckdb::Error,
    },

    #[error("partial load: {committed} rows committed, {abandoned} abandoned: {source}")]
    PartialLoadFailure {
        committed: usize,
        abandoned: usize,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn connection(detail: impl Into<String>, source: duckdb::Error) -> Self {
        Self::Connection {
            detail: detail.into(),
            source: Some(source),
        }
    }

    /// Taxonomy code reported to the orchestrator.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "IOError",
            Self::SchemaMismatch { .. } => "SchemaMismatchError",
            Self::Coercion { .. } => "CoercionError",
            Self::ConstraintViolation(_) => "ConstraintViolation",
            Self::RelationNotFound { .. } => "RelationNotFoundError",
            Self::Connection { .. } => "ConnectionError",
            Self::StatementExecution { .. } => "StatementExecutionError",
            Self::PartialLoadFailure { .. } => "PartialLoadFailure",
            Self::Config(_) => "ConfigError",
        }
    }

    /// Rows already committed to the warehouse when this error was raised.
    pub fn committed(&self) -> usize {
        match self {
            Self::PartialLoadFailure { committed, .. } => *committed,
            _ => 0,
        }
    }
}
