// src/duck/mod.rs

pub mod loader;
pub mod statement;

pub use loader::{CommitMode, LoadOptions, LoadSummary, LoaderState, UpsertLoader};
pub use statement::UpsertStatement;

use duckdb::Connection;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::PipelineError;

/// Hands out warehouse connections by warehouse name.
pub enum Connector {
    /// `<dir>/<warehouse>.duckdb` files. Missing files are an error, never created.
    Directory(PathBuf),
    /// Clones of an already open database, e.g. an in-memory one.
    Shared(Connection),
}

impl Connector {
    pub fn directory(dir: impl Into<PathBuf>) -> Self {
        Connector::Directory(dir.into())
    }

    pub fn connect(&self, warehouse: &str) -> Result<Connection, PipelineError> {
        match self {
            Connector::Directory(dir) => {
                let path = database_path(dir, warehouse);
                if !path.is_file() {
                    return Err(PipelineError::Connection {
                        detail: format!("warehouse database {} does not exist", path.display()),
                        source: None,
                    });
                }
                debug!(path = %path.display(), "opening warehouse");
                Connection::open(&path).map_err(|e| {
                    PipelineError::connection(format!("opening {}", path.display()), e)
                })
            }
            Connector::Shared(conn) => conn
                .try_clone()
                .map_err(|e| PipelineError::connection("cloning shared connection", e)),
        }
    }
}

pub fn database_path(dir: &Path, warehouse: &str) -> PathBuf {
    dir.join(format!("{warehouse}.duckdb"))
}

/// Fresh in-memory warehouse for tests.
#[cfg(test)]
pub(crate) fn open_mem_db() -> Result<Connection, PipelineError> {
    Connection::open_in_memory().map_err(|e| PipelineError::connection("opening in-memory db", e))
}

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_ident("well_id"), "\"well_id\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn directory_connector_never_creates_databases() -> Result<()> {
        let dir = tempdir()?;
        let connector = Connector::directory(dir.path());
        let err = connector.connect("metro").unwrap_err();
        assert_eq!(err.code(), "ConnectionError");
        assert!(!database_path(dir.path(), "metro").exists());
        Ok(())
    }

    #[test]
    fn directory_connector_opens_existing_file() -> Result<()> {
        let dir = tempdir()?;
        let path = database_path(dir.path(), "metro");
        {
            let conn = Connection::open(&path)?;
            conn.execute_batch("CREATE SCHEMA telemetry;")?;
        }
        let conn = Connector::directory(dir.path()).connect("metro")?;
        let n: i64 = conn.query_row(
            "SELECT count(*) FROM information_schema.schemata WHERE schema_name = 'telemetry'",
            [],
            |r| r.get(0),
        )?;
        assert_eq!(n, 1);
        Ok(())
    }

    #[test]
    fn shared_connector_sees_same_database() -> Result<()> {
        let conn = open_mem_db()?;
        conn.execute_batch("CREATE TABLE t(x INTEGER); INSERT INTO t VALUES (1);")?;
        let clone = Connector::Shared(conn).connect("ignored")?;
        let n: i64 = clone.query_row("SELECT count(*) FROM t", [], |r| r.get(0))?;
        assert_eq!(n, 1);
        Ok(())
    }
}
