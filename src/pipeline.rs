// src/pipeline.rs

use chrono::NaiveDateTime;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument, warn};

use crate::archive::archive_output;
use crate::config::{Dataset, RunConfig};
use crate::duck::{Connector, LoadOptions, LoadSummary, UpsertLoader};
use crate::error::PipelineError;
use crate::process::{transform_file, truncate_file, TransformSummary};

/// What happened to one dataset in one run.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetOutcome {
    pub dataset: String,
    pub source: Option<PathBuf>,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success {
        rows_loaded: usize,
        transform: TransformSummary,
        archived: PathBuf,
    },
    Failure {
        code: &'static str,
        message: String,
        rows_committed: usize,
    },
    Skipped {
        reason: String,
    },
}

impl DatasetOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failure { .. })
    }

    fn failure(dataset: &Dataset, source: Option<PathBuf>, failure: &FileFailure) -> Self {
        Self {
            dataset: dataset.name().to_string(),
            source,
            status: OutcomeStatus::Failure {
                code: failure.error.code(),
                message: failure.error.to_string(),
                rows_committed: failure.committed,
            },
        }
    }
}

/// A failed file and the rows it left in the warehouse. Usually that is
/// what the error itself reports; a failure after the load committed keeps
/// the loaded count.
struct FileFailure {
    error: PipelineError,
    committed: usize,
}

impl From<PipelineError> for FileFailure {
    fn from(error: PipelineError) -> Self {
        let committed = error.committed();
        Self { error, committed }
    }
}

/// First file matching `pattern`, in sorted path order.
pub fn discover_input(pattern: &str) -> Result<Option<PathBuf>, PipelineError> {
    let paths = glob::glob(pattern)
        .map_err(|e| PipelineError::Config(format!("bad source pattern {pattern:?}: {e}")))?;
    let mut found = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| {
            let path = e.path().to_path_buf();
            PipelineError::io(path, e.into_error())
        })?;
        if path.is_file() {
            found.push(path);
        }
    }
    found.sort();
    Ok(found.into_iter().next())
}

/// Truncate, transform, load and archive one dataset. Never panics on bad
/// input; every failure becomes a `failure` outcome. On failure the source
/// stays put and the staging file is kept.
#[instrument(level = "info", skip_all, fields(dataset = %dataset.name()))]
pub fn run_dataset(
    dataset: &Dataset,
    connector: &Connector,
    options: &LoadOptions,
    archive_dir: &Path,
    now: NaiveDateTime,
) -> DatasetOutcome {
    let source = match discover_input(&dataset.config().source) {
        Ok(Some(path)) => path,
        Ok(None) => {
            let outcome = DatasetOutcome {
                dataset: dataset.name().to_string(),
                source: None,
                status: OutcomeStatus::Skipped {
                    reason: format!("no file matches {:?}", dataset.config().source),
                },
            };
            warn!("no input found, skipping");
            return outcome;
        }
        Err(e) => {
            error!(code = e.code(), "input discovery failed: {}", e);
            return DatasetOutcome::failure(dataset, None, &e.into());
        }
    };

    match run_file(dataset, &source, connector, options, archive_dir, now) {
        Ok((load, transform, archived)) => {
            info!(rows = load.rows_written, source = %source.display(), "dataset loaded");
            DatasetOutcome {
                dataset: dataset.name().to_string(),
                source: Some(source),
                status: OutcomeStatus::Success {
                    rows_loaded: load.rows_written,
                    transform,
                    archived,
                },
            }
        }
        Err(failure) => {
            error!(
                code = failure.error.code(),
                committed = failure.committed,
                source = %source.display(),
                "dataset failed: {}",
                failure.error
            );
            DatasetOutcome::failure(dataset, Some(source), &failure)
        }
    }
}

fn run_file(
    dataset: &Dataset,
    source: &Path,
    connector: &Connector,
    options: &LoadOptions,
    archive_dir: &Path,
    now: NaiveDateTime,
) -> Result<(LoadSummary, TransformSummary, PathBuf), FileFailure> {
    let cfg = dataset.config();

    // ─── 1) truncate to staging ──────────────────────────────────────
    truncate_file(source, &cfg.staging, cfg.sentinel.as_deref())?;

    // ─── 2) transform ────────────────────────────────────────────────
    let (records, transform) = transform_file(&cfg.staging, dataset, now)?;

    // ─── 3) load ─────────────────────────────────────────────────────
    let mut loader = UpsertLoader::for_dataset(dataset, options.clone());
    let load = loader.load(connector, &records, now)?;

    // ─── 4) archive ──────────────────────────────────────────────────
    let archived =
        archive_output(&cfg.staging, source, archive_dir, now).map_err(|error| FileFailure {
            error,
            committed: load.rows_written,
        })?;

    Ok((load, transform, archived))
}

/// Run every configured dataset in order, or just `only`.
pub fn run_all(
    config: &RunConfig,
    connector: &Connector,
    only: Option<&str>,
    now: NaiveDateTime,
) -> Result<Vec<DatasetOutcome>, PipelineError> {
    let selected: Vec<&Dataset> = match only {
        Some(name) => vec![config
            .dataset(name)
            .ok_or_else(|| PipelineError::Config(format!("unknown dataset `{name}`")))?],
        None => config.datasets.iter().collect(),
    };

    Ok(selected
        .into_iter()
        .map(|ds| run_dataset(ds, connector, &config.load, &config.archive_dir, now))
        .collect())
}
