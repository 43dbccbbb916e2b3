// src/duck/query.rs

//! Read-only SQL access for downstream analysis tools.

use super::TableStore;
use crate::error::{IngestError, Result};
use duckdb::arrow::array::Array;
use duckdb::arrow::util::display::array_value_to_string;
use serde::Serialize;
use tracing::{debug, instrument};

/// Row cap applied when the caller does not ask for less.
pub const DEFAULT_MAX_ROWS: usize = 200;

const ALLOWED_LEADING: &[&str] = &["SELECT", "WITH", "SHOW", "DESCRIBE", "PRAGMA", "SUMMARIZE"];
const ALLOWED_PRAGMAS: &[&str] = &[
    "TABLE_INFO",
    "SHOW_TABLES",
    "SHOW_TABLES_EXPANDED",
    "DATABASE_LIST",
    "DATABASE_SIZE",
    "STORAGE_INFO",
];
const FORBIDDEN: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "COPY", "ATTACH", "DETACH",
    "EXPORT", "IMPORT", "INSTALL", "LOAD", "CALL", "SET", "TRUNCATE", "VACUUM", "CHECKPOINT",
];

/// A statement that passed the read-only checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOnlyQuery {
    sql: String,
}

impl ReadOnlyQuery {
    /// Accept one read-only statement.
    ///
    /// Rejects multiple statements, anything that writes or touches the
    /// catalog, and `SELECT`/`WITH` queries without an explicit `LIMIT`.
    ///
    /// Modifying keywords are only recognised where a statement can start:
    /// the first word, or the first word after an opening parenthesis
    /// (`WITH d AS (DELETE …)`). Elsewhere they are ordinary identifiers, so
    /// a column named `set` or `update` is fine. A modifying statement
    /// hidden anywhere else is not caught here; `cmsquery` also opens the
    /// store read-only.
    pub fn parse(sql: &str) -> Result<Self> {
        let trimmed = sql.trim().trim_end_matches(';').trim_end();
        let words = scan_words(trimmed)?;

        let Some(first) = words.first().map(|w| w.text.as_str()) else {
            return Err(IngestError::Query("empty statement".into()));
        };
        if !ALLOWED_LEADING.contains(&first) {
            return Err(IngestError::Query(format!("{first} statements are not allowed")));
        }
        if let Some(bad) = words
            .iter()
            .find(|w| w.leading && FORBIDDEN.contains(&w.text.as_str()))
        {
            return Err(IngestError::Query(format!("{} is not allowed", bad.text)));
        }
        if first == "PRAGMA" {
            let name = words.get(1).map(|w| w.text.as_str()).unwrap_or_default();
            if !ALLOWED_PRAGMAS.contains(&name) {
                return Err(IngestError::Query(format!("PRAGMA {name} is not allowed")));
            }
        }
        if (first == "SELECT" || first == "WITH") && !words.iter().any(|w| w.text == "LIMIT") {
            return Err(IngestError::Query("query must include a LIMIT clause".into()));
        }

        Ok(Self {
            sql: trimmed.to_string(),
        })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// A bare word of a statement.
#[derive(Debug)]
struct Word {
    /// Upper-cased.
    text: String,
    /// First word of the statement or of a parenthesised clause.
    leading: bool,
}

/// Bare words of `sql`, skipping string literals, quoted identifiers and
/// comments. Errors on a second statement.
fn scan_words(sql: &str) -> Result<Vec<Word>> {
    let mut words = Vec::new();
    let mut chars = sql.chars().peekable();
    let mut word = String::new();
    let mut leading = true;

    let flush = |word: &mut String, words: &mut Vec<Word>, leading: &mut bool| {
        if !word.is_empty() {
            words.push(Word {
                text: word.to_ascii_uppercase(),
                leading: *leading,
            });
            word.clear();
            *leading = false;
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                flush(&mut word, &mut words, &mut leading);
                leading = false;
                // doubled quote inside is an escape; the loop just re-enters
                for q in chars.by_ref() {
                    if q == c {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                flush(&mut word, &mut words, &mut leading);
                for q in chars.by_ref() {
                    if q == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                flush(&mut word, &mut words, &mut leading);
                chars.next();
                let mut prev = ' ';
                for q in chars.by_ref() {
                    if prev == '*' && q == '/' {
                        break;
                    }
                    prev = q;
                }
            }
            ';' => return Err(IngestError::Query("only one statement is allowed".into())),
            '(' => {
                flush(&mut word, &mut words, &mut leading);
                leading = true;
            }
            c if c.is_ascii_alphanumeric() || c == '_' => word.push(c),
            c if c.is_whitespace() => flush(&mut word, &mut words, &mut leading),
            _ => {
                flush(&mut word, &mut words, &mut leading);
                leading = false;
            }
        }
    }
    flush(&mut word, &mut words, &mut leading);
    Ok(words)
}

/// Rows of a read-only query, rendered as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
    /// More rows existed than were returned.
    pub truncated: bool,
    pub summary: String,
}

/// Run `query` and return at most `max_rows` rows.
#[instrument(level = "debug", skip(store, query), fields(sql = %query.sql()))]
pub fn execute(store: &TableStore, query: &ReadOnlyQuery, max_rows: usize) -> Result<QueryResult> {
    let mut stmt = store.connection().prepare(query.sql())?;
    let batches = stmt.query_arrow([])?;
    let schema = batches.get_schema();
    let columns: Vec<String> = schema.fields().iter().map(|f| f.name().clone()).collect();

    let mut rows = Vec::new();
    let mut total = 0usize;
    for batch in batches {
        for r in 0..batch.num_rows() {
            total += 1;
            if rows.len() >= max_rows {
                continue;
            }
            let row = batch
                .columns()
                .iter()
                .map(|col| {
                    if col.is_null(r) {
                        Ok(None)
                    } else {
                        array_value_to_string(col, r).map(Some)
                    }
                })
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| IngestError::Query(e.to_string()))?;
            rows.push(row);
        }
    }
    debug!(total, returned = rows.len(), "query finished");

    Ok(QueryResult {
        summary: format!("{} of {} rows returned", rows.len(), total),
        truncated: total > rows.len(),
        columns,
        rows,
    })
}
