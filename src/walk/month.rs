// src/walk/month.rs

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static MONTH_FOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{4}-\d{2})/").unwrap());

/// A reporting month, keyed by its first day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthPartition {
    first_day: NaiveDate,
}

impl MonthPartition {
    /// Parse a `YYYY-MM` token. Months outside 01-12 are rejected.
    pub fn parse(token: &str) -> Option<Self> {
        let (year, month) = token.split_once('-')?;
        if year.len() != 4 || month.len() != 2 {
            return None;
        }
        let first_day = NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, 1)?;
        Some(Self { first_day })
    }

    /// The first `YYYY-MM/` folder segment in an archive path, if any.
    pub fn from_entry_path(path: &str) -> Option<Self> {
        let token = MONTH_FOLDER.captures(path)?.get(1)?.as_str();
        Self::parse(token)
    }

    pub fn first_day(&self) -> NaiveDate {
        self.first_day
    }

    /// `YYYY-MM`, as it appears in folder names.
    pub fn token(&self) -> String {
        format!("{:04}-{:02}", self.first_day.year(), self.first_day.month())
    }

    /// `YYYY-MM-01`, the value stored in the partition column.
    pub fn timestamp(&self) -> String {
        self.first_day.format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for MonthPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}
