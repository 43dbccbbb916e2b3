// src/walk/mod.rs

//! Walk a top-level archive month by month and yield consolidated tables.

mod month;

pub use month::MonthPartition;

use crate::config::{IngestConfig, TypeWidening};
use crate::error::{IngestError, Result};
use crate::names::sanitize;
use crate::process::frame::read_entry;
use crate::process::{consolidate, FrameBuilder, PartGrouper, PartGroups};
use crate::report::IngestReport;
use crate::Frame;
use std::collections::{btree_map, BTreeMap, BTreeSet, VecDeque};
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;
use tracing::{debug, error, info, instrument, warn};
use zip::ZipArchive;

/// An entry of the top-level archive, as listed during a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEntry {
    pub path: String,
    pub is_dir: bool,
    pub compressed_size: u64,
}

impl AsRef<str> for ContainerEntry {
    fn as_ref(&self) -> &str {
        &self.path
    }
}

/// One consolidated logical table for one month.
#[derive(Debug, Clone)]
pub struct TableFrame {
    pub table_name: String,
    pub month: MonthPartition,
    pub frame: Frame,
}

impl TableFrame {
    pub fn into_parts(self) -> (String, Frame) {
        (self.table_name, self.frame)
    }
}

/// Open `top_path` and return a lazy sequence of `(table, frame)` results.
///
/// Only a missing or unreadable top archive fails here. Once iterating,
/// every month, part and table problem is logged and skipped; an `Err` item
/// means the top archive itself broke mid-walk, after which the sequence
/// ends. Restart by calling `walk` again.
#[instrument(level = "info", skip(top_path, cfg), fields(path = %top_path.as_ref().display()))]
pub fn walk<P: AsRef<Path>>(top_path: P, cfg: &IngestConfig) -> Result<TableFrames> {
    let path = top_path.as_ref();
    let top_archive_error = |reason: String| IngestError::TopArchive {
        path: path.display().to_string(),
        reason,
    };

    let file = File::open(path).map_err(|e| top_archive_error(e.to_string()))?;
    let mut top =
        ZipArchive::new(BufReader::new(file)).map_err(|e| top_archive_error(e.to_string()))?;

    let mut entries = Vec::with_capacity(top.len());
    for i in 0..top.len() {
        let e = top.by_index_raw(i).map_err(|e| top_archive_error(e.to_string()))?;
        entries.push(ContainerEntry {
            path: e.name().to_string(),
            is_dir: e.is_dir(),
            compressed_size: e.compressed_size(),
        });
    }
    debug!(entries = entries.len(), "opened top-level archive");

    let months = distinct_months(&entries);
    if months.is_empty() {
        warn!("no YYYY-MM/ folders in top-level archive");
    } else {
        info!(months = months.len(), "found monthly folders");
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(TableFrames {
        top,
        entries,
        stem,
        months: months.into(),
        current: None,
        grouper: PartGrouper::from_config(cfg)?,
        builder: FrameBuilder::new(cfg.inference.clone(), &cfg.text_extension)?,
        widening: cfg.inference.widening,
        archive_extension: cfg.archive_extension.to_lowercase(),
        report: IngestReport::default(),
        broken: false,
    })
}

/// Distinct months named by `YYYY-MM/` folders, in first-seen order.
pub fn distinct_months<S: AsRef<str>>(entry_names: &[S]) -> Vec<MonthPartition> {
    let mut seen = BTreeSet::new();
    let mut months = Vec::new();
    for name in entry_names {
        let name = name.as_ref();
        match MonthPartition::from_entry_path(name) {
            Some(m) => {
                if seen.insert(m) {
                    months.push(m);
                }
            }
            None => debug!(entry = %name, "no month folder in entry path"),
        }
    }
    months
}

/// The nested archive for `month`.
///
/// Prefers entries under `<top stem>/<YYYY-MM>/`, falling back to a
/// root-level `<YYYY-MM>/` folder. First match in archive order wins.
pub fn locate_nested<'a, S: AsRef<str>>(
    entry_names: &'a [S],
    top_stem: &str,
    month: &MonthPartition,
    archive_extension: &str,
) -> Option<&'a str> {
    let token = month.token();
    let prefixed = format!("{top_stem}/{token}/");
    let bare = format!("{token}/");
    let is_archive = |n: &&str| n.to_lowercase().ends_with(archive_extension);

    let under = |prefix: &str| {
        entry_names
            .iter()
            .map(|n| n.as_ref())
            .filter(is_archive)
            .find(|n| n.starts_with(prefix))
    };
    if top_stem.is_empty() {
        under(&bare)
    } else {
        under(&prefixed).or_else(|| under(&bare))
    }
}

/// State for the month currently being drained.
struct MonthCursor {
    month: MonthPartition,
    archive: ZipArchive<Cursor<Vec<u8>>>,
    /// Table name → every part archive feeding it this month.
    tables: btree_map::IntoIter<String, BTreeSet<String>>,
}

/// Lazy producer of consolidated tables; see [`walk`].
pub struct TableFrames {
    top: ZipArchive<BufReader<File>>,
    entries: Vec<ContainerEntry>,
    stem: String,
    months: VecDeque<MonthPartition>,
    current: Option<MonthCursor>,
    grouper: PartGrouper,
    builder: FrameBuilder,
    widening: TypeWidening,
    archive_extension: String,
    report: IngestReport,
    broken: bool,
}

impl TableFrames {
    /// Counters for everything walked so far.
    pub fn report(&self) -> &IngestReport {
        &self.report
    }

    pub fn into_report(self) -> IngestReport {
        self.report
    }

    /// Resolve and open the nested archive for `month`. `Ok(None)` skips it.
    fn open_month(&mut self, month: MonthPartition) -> Result<Option<MonthCursor>> {
        self.report.months_seen += 1;

        let files: Vec<&ContainerEntry> = self.entries.iter().filter(|e| !e.is_dir).collect();
        let Some(nested) = locate_nested(&files, &self.stem, &month, &self.archive_extension)
            .map(str::to_string)
        else {
            warn!(month = %month, "No ZIP file found in {}/", month.token());
            self.report.months_skipped += 1;
            self.report.warn(format!("{month}: no nested archive"));
            return Ok(None);
        };
        let compressed_size = self
            .entries
            .iter()
            .find(|e| e.path == nested)
            .map_or(0, |e| e.compressed_size);
        debug!(month = %month, nested = %nested, compressed_size, "Found nested ZIP");

        // Reading out of the top archive failing means it is corrupt: fatal.
        let bytes = read_entry(&mut self.top, &nested)?;
        let archive = match ZipArchive::new(Cursor::new(bytes)) {
            Ok(a) => a,
            Err(e) => {
                warn!(month = %month, nested = %nested, "nested archive unreadable: {}", e);
                self.report.months_skipped += 1;
                self.report.warn(format!("{month}: nested archive {nested} unreadable: {e}"));
                return Ok(None);
            }
        };

        let groups = self.grouper.group(archive.file_names());
        let tables = self.tables_by_name(month, groups);
        debug!(
            month = %month,
            tables = tables.len(),
            parts = tables.values().map(BTreeSet::len).sum::<usize>(),
            "grouped part archives"
        );
        Ok(Some(MonthCursor {
            month,
            archive,
            tables: tables.into_iter(),
        }))
    }

    /// Re-key part groups by sanitized table name. Distinct logical keys
    /// naming the same table (`formulary 20240131`, `formulary-20240229`) merge, so each
    /// table yields at most one frame per month.
    fn tables_by_name(
        &mut self,
        month: MonthPartition,
        groups: PartGroups,
    ) -> BTreeMap<String, BTreeSet<String>> {
        let mut tables: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (key, parts) in groups {
            match sanitize(&key) {
                Ok(name) => tables.entry(name).or_default().extend(parts),
                Err(e) => {
                    warn!(month = %month, key = %key, "{}", e);
                    self.report.tables_skipped += 1;
                    self.report.warn(format!("{month}: {e}"));
                }
            }
        }
        tables
    }

    /// Build and consolidate one logical table of the current month.
    fn build_table(
        &mut self,
        cursor: &mut MonthCursor,
        table_name: String,
        parts: &BTreeSet<String>,
    ) -> Option<TableFrame> {
        info!(table = %table_name, month = %cursor.month, parts = parts.len(), "Preparing to load data into table");

        let mut frames = Vec::new();
        for part in parts {
            debug!(part = %part, "Reading part ZIP");
            let bytes = match read_entry(&mut cursor.archive, part) {
                Ok(b) => b,
                Err(e) => {
                    error!(part = %part, "cannot read part archive: {}", e);
                    self.report.parts_skipped += 1;
                    self.report.warn(format!("{}: cannot read part {part}: {e}", cursor.month));
                    continue;
                }
            };
            self.report.parts_read += 1;
            frames.extend(self.builder.build(part, bytes, &cursor.month, &mut self.report));
        }

        match consolidate(&table_name, frames, self.widening) {
            Ok(Some(frame)) => {
                self.report.tables_yielded += 1;
                Some(TableFrame {
                    table_name,
                    month: cursor.month,
                    frame,
                })
            }
            Ok(None) => {
                self.report.tables_skipped += 1;
                self.report.warn(format!("{}: no valid data for table {table_name}", cursor.month));
                None
            }
            Err(e) => {
                error!(table = %table_name, month = %cursor.month, "Failed to concatenate frames: {}", e);
                self.report.tables_skipped += 1;
                self.report.warn(format!("{}: {e}", cursor.month));
                None
            }
        }
    }
}

impl Iterator for TableFrames {
    type Item = Result<TableFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.broken {
            return None;
        }
        loop {
            if let Some(mut cursor) = self.current.take() {
                if let Some((table_name, parts)) = cursor.tables.next() {
                    let built = self.build_table(&mut cursor, table_name, &parts);
                    self.current = Some(cursor);
                    match built {
                        Some(table) => return Some(Ok(table)),
                        None => continue,
                    }
                }
                debug!(month = %cursor.month, "month done");
                // cursor (and its nested archive) dropped here
            }

            let month = self.months.pop_front()?;
            match self.open_month(month) {
                Ok(Some(cursor)) => self.current = Some(cursor),
                Ok(None) => continue,
                Err(e) => {
                    error!(month = %month, "top-level archive unreadable: {}", e);
                    self.broken = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn months_are_distinct_in_first_seen_order() {
        let names = [
            "top/2024-02/",
            "top/2024-02/inner.zip",
            "top/2024-01/inner.zip",
            "top/readme.txt",
            "top/2024-02/other.zip",
        ];
        let tokens: Vec<String> = distinct_months(&names).iter().map(|m| m.token()).collect();
        assert_eq!(tokens, vec!["2024-02", "2024-01"]);
    }

    #[test]
    fn no_month_folders_means_no_months() {
        assert!(distinct_months(&["a.zip", "b/c.txt"]).is_empty());
    }

    #[test]
    fn nested_lookup_prefers_stem_prefix() {
        let month = MonthPartition::parse("2024-01").unwrap();
        let names = [
            "2024-01/root.zip",
            "PDP/2024-01/",
            "PDP/2024-01/nested.ZIP",
            "PDP/2024-01/second.zip",
        ];
        assert_eq!(locate_nested(&names, "PDP", &month, ".zip"), Some("PDP/2024-01/nested.ZIP"));
        assert_eq!(locate_nested(&names, "Other", &month, ".zip"), Some("2024-01/root.zip"));
        assert_eq!(locate_nested(&names[1..2], "PDP", &month, ".zip"), None);
    }
}
