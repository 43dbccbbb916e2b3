// src/report.rs

use serde::Serialize;
use tracing::info;

/// Counters accumulated over one ingest run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub months_seen: u64,
    /// Months with no nested archive, or one that could not be opened.
    pub months_skipped: u64,
    pub parts_read: u64,
    pub parts_skipped: u64,
    pub entries_parsed: u64,
    pub entries_failed: u64,
    pub tables_yielded: u64,
    pub tables_skipped: u64,
    pub tables_written: u64,
    pub tables_failed: u64,
    pub rows_written: u64,
    /// One line per recoverable problem, in the order they happened.
    pub warnings: Vec<String>,
}

impl IngestReport {
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Add another report into `self`, saturating on overflow.
    pub fn merge(&mut self, other: IngestReport) {
        self.months_seen = self.months_seen.saturating_add(other.months_seen);
        self.months_skipped = self.months_skipped.saturating_add(other.months_skipped);
        self.parts_read = self.parts_read.saturating_add(other.parts_read);
        self.parts_skipped = self.parts_skipped.saturating_add(other.parts_skipped);
        self.entries_parsed = self.entries_parsed.saturating_add(other.entries_parsed);
        self.entries_failed = self.entries_failed.saturating_add(other.entries_failed);
        self.tables_yielded = self.tables_yielded.saturating_add(other.tables_yielded);
        self.tables_skipped = self.tables_skipped.saturating_add(other.tables_skipped);
        self.tables_written = self.tables_written.saturating_add(other.tables_written);
        self.tables_failed = self.tables_failed.saturating_add(other.tables_failed);
        self.rows_written = self.rows_written.saturating_add(other.rows_written);
        self.warnings.extend(other.warnings);
    }

    pub fn log_summary(&self) {
        info!(
            months = self.months_seen,
            months_skipped = self.months_skipped,
            parts = self.parts_read,
            parts_skipped = self.parts_skipped,
            entries_failed = self.entries_failed,
            tables_written = self.tables_written,
            tables_skipped = self.tables_skipped + self.tables_failed,
            rows = self.rows_written,
            warnings = self.warnings.len(),
            "ingest finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_adds_counts_and_keeps_warning_order() {
        let mut a = IngestReport {
            months_seen: 1,
            rows_written: 10,
            ..Default::default()
        };
        a.warn("first");
        let mut b = IngestReport {
            months_seen: 2,
            rows_written: u64::MAX,
            ..Default::default()
        };
        b.warn("second");

        a.merge(b);
        assert_eq!(a.months_seen, 3);
        assert_eq!(a.rows_written, u64::MAX);
        assert_eq!(a.warnings, vec!["first", "second"]);
    }
}
