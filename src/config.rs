// src/config.rs

use crate::error::{IngestError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// How column types from different parts of one table are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeWidening {
    /// Types must match; an all-null column adopts the other side's type.
    #[default]
    Strict,
    /// Like `Strict`, plus integer/float conflicts widen to float.
    Numeric,
    /// Like `Numeric`, plus any remaining conflict widens to text.
    Text,
}

/// What the store does when a table already exists.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Append rows unconditionally; reruns duplicate data.
    #[default]
    Append,
    /// Delete rows for the months present in the frame, then append.
    ReplacePartition,
}

/// Explicit schema-inference policy for the delimited text parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferencePolicy {
    /// Rows sampled per text entry when inferring column types.
    pub sample_rows: usize,
    /// Field delimiter byte.
    pub delimiter: char,
    /// Exact field values read as missing, in every column.
    pub null_tokens: Vec<String>,
    pub widening: TypeWidening,
    /// Rows per Arrow batch while decoding.
    pub batch_size: usize,
}

impl Default for InferencePolicy {
    fn default() -> Self {
        Self {
            sample_rows: 10_000,
            delimiter: '|',
            null_tokens: vec![String::new(), "XXXXX".to_string()],
            widening: TypeWidening::default(),
            batch_size: 8_192,
        }
    }
}

impl InferencePolicy {
    /// Anchored alternation over the null tokens, e.g. `^(?:|XXXXX)$`.
    pub fn null_regex(&self) -> Result<Regex> {
        let alternatives: Vec<String> = self
            .null_tokens
            .iter()
            .map(|t| regex::escape(t))
            .collect();
        Regex::new(&format!("^(?:{})$", alternatives.join("|")))
            .map_err(|e| IngestError::Config(format!("null tokens: {e}")))
    }

    pub fn delimiter_byte(&self) -> Result<u8> {
        if self.delimiter.is_ascii() {
            Ok(self.delimiter as u8)
        } else {
            Err(IngestError::Config(format!(
                "delimiter {:?} is not a single ASCII byte",
                self.delimiter
            )))
        }
    }

    fn validate(&self) -> Result<()> {
        if self.sample_rows == 0 {
            return Err(IngestError::Config("sample_rows must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(IngestError::Config("batch_size must be at least 1".into()));
        }
        self.delimiter_byte()?;
        self.null_regex()?;
        Ok(())
    }
}

/// Settings for one ingest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub inference: InferencePolicy,
    pub write_mode: WriteMode,
    pub archive_extension: String,
    pub text_extension: String,
    /// Part archives whose name contains this token (any case) are skipped.
    pub exclude_token: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            inference: InferencePolicy::default(),
            write_mode: WriteMode::default(),
            archive_extension: ".zip".to_string(),
            text_extension: ".txt".to_string(),
            exclude_token: "sample".to_string(),
        }
    }
}

impl IngestConfig {
    /// Load a YAML config file; missing keys keep their defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let cfg: IngestConfig = serde_yaml::from_str(&text)
            .map_err(|e| IngestError::Config(format!("{}: {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.inference.validate()?;
        if !self.archive_extension.starts_with('.') || !self.text_extension.starts_with('.') {
            return Err(IngestError::Config(
                "extensions must start with '.'".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_null_regex_matches_only_tokens() -> Result<()> {
        let re = InferencePolicy::default().null_regex()?;
        assert!(re.is_match(""));
        assert!(re.is_match("XXXXX"));
        assert!(!re.is_match("XXXX"));
        assert!(!re.is_match(" "));
        assert!(!re.is_match("abc"));
        Ok(())
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let cfg: IngestConfig = serde_yaml::from_str(
            "write_mode: replace_partition\ninference:\n  sample_rows: 50\n  widening: numeric\n",
        )
        .unwrap();
        assert_eq!(cfg.write_mode, WriteMode::ReplacePartition);
        assert_eq!(cfg.inference.sample_rows, 50);
        assert_eq!(cfg.inference.widening, TypeWidening::Numeric);
        assert_eq!(cfg.inference.delimiter, '|');
        assert_eq!(cfg.text_extension, ".txt");
    }

    #[test]
    fn zero_sample_rows_is_rejected() {
        let mut cfg = IngestConfig::default();
        cfg.inference.sample_rows = 0;
        assert!(matches!(cfg.validate(), Err(IngestError::Config(_))));
    }
}
