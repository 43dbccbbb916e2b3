use anyhow::{Context, Result};
use clap::Parser;
use cmsloader::{duck::TableStore, logging, IngestConfig, WriteMode};
use std::path::PathBuf;
use tracing::info;

/// Extract nested Monthly Prescription Drug Plan Formulary and Pharmacy
/// Network Information archives and load them into DuckDB.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Top-level archive holding one YYYY-MM/ folder per month
    #[arg(long)]
    zip_path: PathBuf,

    /// DuckDB database file, created if missing
    #[arg(long, default_value = "database.db")]
    db_path: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides
    #[arg(long, default_value = "info")]
    log_level: String,

    /// YAML file with inference and write settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the config file's write mode
    #[arg(long, value_enum)]
    mode: Option<WriteMode>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // ─── 1) init logging ─────────────────────────────────────────────
    logging::init(&args.log_level);
    info!("startup");

    // ─── 2) load settings ────────────────────────────────────────────
    let mut cfg = match &args.config {
        Some(path) => IngestConfig::from_yaml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => IngestConfig::default(),
    };
    if let Some(mode) = args.mode {
        cfg.write_mode = mode;
    }
    cfg.validate()?;

    // ─── 3) open store & run ─────────────────────────────────────────
    let mut store = TableStore::open(&args.db_path)
        .with_context(|| format!("opening database {}", args.db_path.display()))?;
    let report = cmsloader::run(&args.zip_path, &mut store, &cfg)
        .with_context(|| format!("ingesting {}", args.zip_path.display()))?;

    report.log_summary();
    info!("all done");
    Ok(())
}
