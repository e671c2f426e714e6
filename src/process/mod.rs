// src/process/mod.rs
pub mod date_parser;
pub mod numeric;
pub mod record;
pub mod transform;
pub mod truncate;
pub mod utils;

pub use numeric::{
    normalize_decimal, sanitize_integer, sanitize_numeric, SanitizeError, SignConvention,
};
pub use record::{Column, ColumnType, Record, RecordSet, Value};
pub use transform::{transform, transform_file, TransformSummary};
pub use truncate::{truncate_at_sentinel, truncate_file, TruncateSummary};
