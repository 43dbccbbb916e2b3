// src/process/frame.rs

use crate::config::InferencePolicy;
use crate::error::{IngestError, Result};
use crate::report::IngestReport;
use crate::walk::MonthPartition;
use crate::Frame;
use arrow::array::{ArrayRef, StringArray};
use arrow::compute::concat_batches;
use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use regex::Regex;
use std::io::{Cursor, Read};
use std::iter;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};
use zip::ZipArchive;

/// Name of the column carrying the source month on every row.
pub const PARTITION_COLUMN: &str = "timestamp";

/// Turns part archives into frames, one per delimited text entry.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    policy: InferencePolicy,
    delimiter: u8,
    null_regex: Regex,
    text_extension: String,
}

impl FrameBuilder {
    pub fn new(policy: InferencePolicy, text_extension: &str) -> Result<Self> {
        let delimiter = policy.delimiter_byte()?;
        let null_regex = policy.null_regex()?;
        Ok(Self {
            policy,
            delimiter,
            null_regex,
            text_extension: text_extension.to_lowercase(),
        })
    }

    /// Open `part_bytes` as an archive and parse every text entry in it.
    ///
    /// Nothing here is fatal: an unreadable part, a part without text
    /// entries, or a text entry that fails to parse is logged, counted in
    /// `report`, and skipped. Siblings keep going.
    #[instrument(level = "debug", skip(self, part_name, part_bytes, month, report), fields(part = %part_name, month = %month))]
    pub fn build(
        &self,
        part_name: &str,
        part_bytes: Vec<u8>,
        month: &MonthPartition,
        report: &mut IngestReport,
    ) -> Vec<Frame> {
        let mut archive = match ZipArchive::new(Cursor::new(part_bytes)) {
            Ok(a) => a,
            Err(e) => {
                error!(part = %part_name, "cannot open part archive: {}", e);
                report.parts_skipped += 1;
                report.warn(format!("{month}: part {part_name} is not a readable archive: {e}"));
                return Vec::new();
            }
        };

        let text_entries: Vec<String> = archive
            .file_names()
            .filter(|n| !n.ends_with('/') && n.to_lowercase().ends_with(&self.text_extension))
            .map(str::to_string)
            .collect();
        if text_entries.is_empty() {
            warn!(part = %part_name, "no {} file found in part", self.text_extension);
            report.parts_skipped += 1;
            report.warn(format!("{month}: part {part_name} has no text entries"));
            return Vec::new();
        }

        let mut frames = Vec::with_capacity(text_entries.len());
        for entry_name in text_entries {
            debug!(entry = %entry_name, "reading text entry");
            let parsed = read_entry(&mut archive, &entry_name)
                .and_then(|bytes| self.parse_text(&decode_lossy(&entry_name, &bytes), month));
            match parsed {
                Ok(frame) => {
                    debug!(entry = %entry_name, rows = frame.num_rows(), "parsed text entry");
                    report.entries_parsed += 1;
                    frames.push(frame);
                }
                Err(e) => {
                    error!("Failed to parse {} in {}: {}", entry_name, part_name, e);
                    report.entries_failed += 1;
                    report.warn(format!("{month}: failed to parse {entry_name} in {part_name}: {e}"));
                }
            }
        }
        frames
    }

    /// Parse delimited text into a frame tagged with `month`.
    ///
    /// Column types come from the first `sample_rows` rows; the configured
    /// null tokens read as missing in every column.
    pub fn parse_text(&self, content: &str, month: &MonthPartition) -> Result<Frame> {
        let format = Format::default()
            .with_header(true)
            .with_delimiter(self.delimiter)
            .with_null_regex(self.null_regex.clone());

        let (schema, sampled) = format
            .clone()
            .infer_schema(Cursor::new(content.as_bytes()), Some(self.policy.sample_rows))?;
        if schema.fields().is_empty() {
            return Err(IngestError::Arrow(arrow::error::ArrowError::CsvError(
                "text entry has no header row".to_string(),
            )));
        }
        debug!(columns = schema.fields().len(), sampled, "inferred schema");

        let schema = Arc::new(schema);
        let reader = ReaderBuilder::new(schema.clone())
            .with_format(format)
            .with_batch_size(self.policy.batch_size)
            .build(Cursor::new(content.as_bytes()))?;
        let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
        let frame = concat_batches(&schema, &batches)?;

        with_partition_column(frame, month)
    }
}

/// Append (or overwrite) the constant `timestamp` column.
pub fn with_partition_column(frame: RecordBatch, month: &MonthPartition) -> Result<Frame> {
    let stamp = month.timestamp();
    let rows = frame.num_rows();
    let schema = frame.schema();

    let mut fields: Vec<Field> = Vec::with_capacity(schema.fields().len() + 1);
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len() + 1);
    for (field, column) in schema.fields().iter().zip(frame.columns()) {
        if field.name() == PARTITION_COLUMN {
            continue;
        }
        fields.push(field.as_ref().clone());
        columns.push(column.clone());
    }
    fields.push(Field::new(PARTITION_COLUMN, DataType::Utf8, false));
    columns.push(Arc::new(StringArray::from_iter_values(
        iter::repeat(stamp.as_str()).take(rows),
    )));

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// Decode as UTF-8, swapping invalid sequences for U+FFFD.
fn decode_lossy(entry_name: &str, bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let replaced = text.matches(char::REPLACEMENT_CHARACTER).count();
    if replaced > 0 {
        warn!(entry = %entry_name, replaced, "invalid UTF-8 replaced");
    }
    text.into_owned()
}

pub(crate) fn read_entry<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>> {
    let mut entry = archive.by_name(name)?;
    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut buf)?;
    Ok(buf)
}
