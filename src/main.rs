use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Parser;
use metroetl::{config::RunConfig, duck::Connector, logging, pipeline};
use std::{
    io::{self, Write},
    path::PathBuf,
};
use tracing::info;

/// Truncate, clean and upsert utility-telemetry CSV exports.
#[derive(Parser, Debug)]
#[command(name = "metroetl", version, about)]
struct Args {
    /// YAML configuration document.
    #[arg(long, env = "METROETL_CONFIG", default_value = "metroetl.yaml")]
    config: PathBuf,

    /// Run only this dataset.
    #[arg(long)]
    dataset: Option<String>,

    /// Directory holding `<warehouse>.duckdb` files.
    #[arg(long, env = "WAREHOUSE_DIR")]
    warehouse_dir: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // ─── 1) init logging ─────────────────────────────────────────────
    tracing::subscriber::with_default(logging::subscriber("info"), || run(args))
}

fn run(args: Args) -> Result<()> {
    info!("startup");

    // ─── 2) load + validate configuration ────────────────────────────
    let cfg = RunConfig::from_path(&args.config)
        .with_context(|| format!("loading configuration {}", args.config.display()))?;

    // ─── 3) run datasets in order ────────────────────────────────────
    let connector = Connector::directory(&args.warehouse_dir);
    let now = Local::now().naive_local();
    let outcomes = pipeline::run_all(&cfg, &connector, args.dataset.as_deref(), now)
        .context("selecting datasets")?;

    // ─── 4) one JSON line per dataset ────────────────────────────────
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for outcome in &outcomes {
        serde_json::to_writer(&mut out, outcome)?;
        writeln!(out)?;
    }
    out.flush()?;

    let failed = outcomes.iter().filter(|o| o.is_failure()).count();
    if failed > 0 {
        bail!("{failed} of {} datasets failed", outcomes.len());
    }
    info!(datasets = outcomes.len(), "done");
    Ok(())
}
