// src/config/mod.rs

pub mod types;
pub mod validate;

pub use types::{DatasetConfig, PipelineConfig, TargetRelation, ValueFilter};
pub use validate::Dataset;

use std::{collections::HashSet, fs, path::Path, path::PathBuf};
use tracing::info;

use crate::duck::LoadOptions;
use crate::error::PipelineError;

/// Validated configuration for one run. Immutable once built.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub archive_dir: PathBuf,
    pub load: LoadOptions,
    pub datasets: Vec<Dataset>,
}

impl RunConfig {
    /// Read and validate the YAML document at `path`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let cfg = Self::from_yaml_str(&text)?;
        info!(
            path = %path.display(),
            datasets = cfg.datasets.len(),
            "loaded configuration"
        );
        Ok(cfg)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, PipelineError> {
        let raw: PipelineConfig = serde_yaml::from_str(text)
            .map_err(|e| PipelineError::Config(format!("parsing configuration: {e}")))?;
        Self::validate(raw)
    }

    pub fn validate(raw: PipelineConfig) -> Result<Self, PipelineError> {
        if raw.datasets.is_empty() {
            return Err(PipelineError::Config("no datasets configured".into()));
        }
        if raw.load.batch_size == 0 {
            return Err(PipelineError::Config("load.batch_size must be at least 1".into()));
        }

        let mut names = HashSet::new();
        let mut datasets = Vec::with_capacity(raw.datasets.len());
        for ds in raw.datasets {
            if !names.insert(ds.name.clone()) {
                return Err(PipelineError::Config(format!(
                    "dataset `{}` defined twice",
                    ds.name
                )));
            }
            datasets.push(ds.validate()?);
        }

        Ok(Self {
            archive_dir: raw.archive_dir,
            load: raw.load,
            datasets,
        })
    }

    pub fn dataset(&self, name: &str) -> Option<&Dataset> {
        self.datasets.iter().find(|d| d.name() == name)
    }
}
