// src/process/group.rs

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Logical table key → part archive entry names, sorted.
pub type PartGroups = BTreeMap<String, BTreeSet<String>>;

/// Groups multi-part archives (`<logical>[-_ ]?part[-_ ]?<N>.zip`) by logical name.
#[derive(Debug, Clone)]
pub struct PartGrouper {
    extension: String,
    exclude_token: String,
    part_suffix: Regex,
}

impl PartGrouper {
    pub fn new(archive_extension: &str, exclude_token: &str) -> Result<Self> {
        let part_suffix = Regex::new(&format!(
            r"(?i)[-_\s]?part[-_\s]?\d+{}$",
            regex::escape(archive_extension)
        ))
        .map_err(|e| IngestError::Config(format!("archive extension: {e}")))?;
        Ok(Self {
            extension: archive_extension.to_lowercase(),
            exclude_token: exclude_token.to_lowercase(),
            part_suffix,
        })
    }

    pub fn from_config(cfg: &IngestConfig) -> Result<Self> {
        Self::new(&cfg.archive_extension, &cfg.exclude_token)
    }

    /// True for archive entries that take part in grouping.
    pub fn accepts(&self, entry_name: &str) -> bool {
        let lower = entry_name.to_lowercase();
        lower.ends_with(&self.extension)
            && (self.exclude_token.is_empty() || !lower.contains(&self.exclude_token))
    }

    /// Grouping key for an accepted entry: its file name without the
    /// `partN` suffix, or without the extension when there is no suffix.
    pub fn logical_key(&self, entry_name: &str) -> Option<String> {
        let base = entry_name.rsplit('/').next().unwrap_or(entry_name);
        let key = if self.part_suffix.is_match(base) {
            self.part_suffix.replace(base, "").into_owned()
        } else {
            base[..base.len().saturating_sub(self.extension.len())].to_string()
        };
        if key.trim().is_empty() {
            None
        } else {
            Some(key)
        }
    }

    /// Group entry names by logical key. Input order does not matter; each
    /// group iterates its parts in lexicographic order.
    pub fn group<I, S>(&self, entry_names: I) -> PartGroups
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut groups = PartGroups::new();
        for name in entry_names {
            let name = name.as_ref();
            if !self.accepts(name) {
                debug!(entry = %name, "not a part archive; ignored");
                continue;
            }
            match self.logical_key(name) {
                Some(key) => {
                    groups.entry(key).or_default().insert(name.to_string());
                }
                None => warn!(entry = %name, "part archive has no logical name; ignored"),
            }
        }
        groups
    }
}
