// src/pipeline.rs

use crate::config::IngestConfig;
use crate::duck::TableStore;
use crate::error::Result;
use crate::report::IngestReport;
use crate::walk::{walk, TableFrame};
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, instrument};

/// Walk `zip_path` and write every consolidated table into `store`.
///
/// Fatal errors (top archive missing, unreadable or corrupt) abort the run.
/// A table the store refuses is logged and counted; later tables still go
/// in. Tables written before a failure stay written.
#[instrument(level = "info", skip(zip_path, store, cfg), fields(zip = %zip_path.as_ref().display()))]
pub fn run<P: AsRef<Path>>(zip_path: P, store: &mut TableStore, cfg: &IngestConfig) -> Result<IngestReport> {
    let start = Instant::now();
    let mut tables = walk(zip_path, cfg)?;
    let mut written = IngestReport::default();

    for item in tables.by_ref() {
        let TableFrame {
            table_name,
            month,
            frame,
        } = item?;
        match store.write(&table_name, &frame, cfg.write_mode) {
            Ok(outcome) => {
                written.tables_written += 1;
                written.rows_written += outcome.rows() as u64;
            }
            Err(e) => {
                error!(table = %table_name, month = %month, "write failed: {}", e);
                written.tables_failed += 1;
                written.warn(format!("{month}: write of {table_name} failed: {e}"));
            }
        }
        // frame dropped here; the store owns the rows now
    }

    let mut report = tables.into_report();
    report.merge(written);
    info!(elapsed = ?start.elapsed(), "walk complete");
    Ok(report)
}
