use anyhow::{Context, Result};
use clap::Parser;
use cmsloader::duck::query::{execute, ReadOnlyQuery, DEFAULT_MAX_ROWS};
use cmsloader::duck::TableStore;
use cmsloader::logging;
use std::path::PathBuf;

/// Run one read-only statement against a loaded database and print JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long, default_value = "database.db")]
    db_path: PathBuf,

    /// SELECT/WITH (with LIMIT), SHOW, DESCRIBE, SUMMARIZE or PRAGMA table_info
    #[arg(long)]
    sql: String,

    #[arg(long, default_value_t = DEFAULT_MAX_ROWS)]
    max_rows: usize,

    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(&args.log_level);

    let store = TableStore::open_read_only(&args.db_path)
        .with_context(|| format!("opening database {}", args.db_path.display()))?;
    let query = ReadOnlyQuery::parse(&args.sql)?;
    let result = execute(&store, &query, args.max_rows.min(DEFAULT_MAX_ROWS))?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
