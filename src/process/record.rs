// src/process/record.rs

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Declared type of a column, both in the source schema and in the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    Integer,
    #[serde(alias = "real")]
    Numeric,
    Date,
    /// Only produced for the load-time stamp column.
    Timestamp,
}

impl ColumnType {
    /// SQL type the bound text parameter is cast to.
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Text => "VARCHAR",
            ColumnType::Integer => "BIGINT",
            ColumnType::Numeric => "DOUBLE",
            ColumnType::Date => "DATE",
            ColumnType::Timestamp => "TIMESTAMP",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Numeric)
    }
}

/// A single transformed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    /// Canonical numeric string, see `process::numeric`.
    Numeric(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Text form bound as a statement parameter; `None` binds SQL NULL.
    pub fn to_param(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) | Value::Numeric(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Value::Timestamp(ts) => Some(ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
        }
    }
}

/// Canonical column descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
}

/// One output row; `values` line up with [`RecordSet::columns`].
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Source line the row was read from.
    pub line: u64,
    pub values: Vec<Value>,
}

/// Transformer output, consumed by the loader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    pub columns: Vec<Column>,
    pub records: Vec<Record>,
}

impl RecordSet {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Value of `column` in `record`, if the column exists.
    pub fn get<'a>(&self, record: &'a Record, column: &str) -> Option<&'a Value> {
        self.column_index(column).and_then(|i| record.values.get(i))
    }
}
