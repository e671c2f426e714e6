use anyhow::{Context, Result};
use clap::Parser;
use metroetl::{config::RunConfig, duck::LoadOptions, process::ColumnType};
use serde::Serialize;
use std::{collections::BTreeMap, io, path::PathBuf};

/// Validate a metroetl configuration and print what each dataset will do.
#[derive(Parser, Debug)]
#[command(name = "config_check", version, about)]
struct Args {
    #[arg(long, env = "METROETL_CONFIG", default_value = "metroetl.yaml")]
    config: PathBuf,
}

#[derive(Serialize)]
struct Report<'a> {
    archive_dir: &'a PathBuf,
    load: &'a LoadOptions,
    datasets: Vec<DatasetSummary<'a>>,
}

#[derive(Serialize)]
struct DatasetSummary<'a> {
    name: &'a str,
    source: &'a str,
    sentinel: Option<&'a str>,
    target: String,
    columns: BTreeMap<&'a str, ColumnType>,
    primary_key: &'a [String],
    update_columns: &'a [String],
    modified_column: &'a str,
    load_timestamp_column: Option<&'a str>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = RunConfig::from_path(&args.config)
        .with_context(|| format!("invalid configuration {}", args.config.display()))?;

    let datasets = cfg
        .datasets
        .iter()
        .map(|ds| {
            let c = ds.config();
            DatasetSummary {
                name: ds.name(),
                source: &c.source,
                sentinel: c.sentinel.as_deref(),
                target: c.target.to_string(),
                columns: ds.canonical_columns().collect(),
                primary_key: &c.primary_key,
                update_columns: &c.update_columns,
                modified_column: &c.modified_column,
                load_timestamp_column: c.load_timestamp_column.as_deref(),
            }
        })
        .collect();

    let report = Report {
        archive_dir: &cfg.archive_dir,
        load: &cfg.load,
        datasets,
    };
    serde_yaml::to_writer(io::stdout().lock(), &report).context("writing summary")?;
    Ok(())
}
