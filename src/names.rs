// src/names.rs

use crate::error::{IngestError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s_.]+").unwrap());
static TRAILING_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)-\d{8}(-part-\d+)?$").unwrap());

/// Derive the canonical table name for a raw file name.
///
/// `"Formulary File_20240101-part-2.txt"` → `"formulary-file"`.
///
/// - the directory part and the final extension are dropped
/// - runs of whitespace, underscores or dots become one hyphen
/// - a trailing `-YYYYMMDD` (optionally `-part-N`) stamp is removed
/// - the result is lower-cased
///
/// Pure and idempotent: feeding the output back in returns it unchanged.
pub fn sanitize(raw_name: &str) -> Result<String> {
    if raw_name.trim().is_empty() {
        return Err(IngestError::InvalidName(raw_name.to_string()));
    }
    let stem = Path::new(raw_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(raw_name);

    let mut name = SEPARATORS.replace_all(stem, "-").into_owned();
    // stamps can be stacked ("-20240101-20240201"); strip to a fixed point
    while let Some(m) = TRAILING_DATE.find(&name) {
        name.truncate(m.start());
    }
    let name = name.to_lowercase();

    if name.is_empty() || name.chars().all(|c| c == '-') {
        return Err(IngestError::InvalidName(raw_name.to_string()));
    }
    Ok(name)
}

/// Quote `name` as a DuckDB identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_extension_separators_and_case() -> Result<()> {
        assert_eq!(sanitize("Basic Drugs Formulary File.txt")?, "basic-drugs-formulary-file");
        assert_eq!(sanitize("pharmacy__networks.zip")?, "pharmacy-networks");
        assert_eq!(sanitize("2024-01/nested/Plan Information.txt")?, "plan-information");
        assert_eq!(sanitize("a.b.c.txt")?, "a-b-c");
        Ok(())
    }

    #[test]
    fn trailing_date_and_part_are_removed() -> Result<()> {
        let expected = "pharmacy-networks";
        for raw in [
            "pharmacy networks",
            "pharmacy networks 20240131",
            "pharmacy_networks_20240131.txt",
            "pharmacy networks 20240131 PART 3.txt",
            "Pharmacy-Networks-20231231-part-12.zip",
        ] {
            assert_eq!(sanitize(raw)?, expected, "raw = {raw}");
        }
        Ok(())
    }

    #[test]
    fn date_not_at_end_or_wrong_width_is_kept() -> Result<()> {
        assert_eq!(sanitize("drugs 20240131 extra")?, "drugs-20240131-extra");
        assert_eq!(sanitize("drugs 2024013")?, "drugs-2024013");
        assert_eq!(sanitize("drugs 202401311")?, "drugs-202401311");
        Ok(())
    }

    #[test]
    fn sanitize_is_idempotent() -> Result<()> {
        for raw in [
            "Beneficiary Cost File_20240101.txt",
            "geographic locator file",
            "a.b.c.txt",
            "x 20240101 20240201",
            "Pricing  File -part-1",
            "excluded_drugs_formulary_file_20240101-part-2",
        ] {
            let once = sanitize(raw)?;
            assert_eq!(sanitize(&once)?, once, "raw = {raw}");
        }
        Ok(())
    }

    #[test]
    fn empty_names_are_invalid() {
        assert!(matches!(sanitize(""), Err(IngestError::InvalidName(_))));
        assert!(matches!(sanitize("   "), Err(IngestError::InvalidName(_))));
        assert!(matches!(sanitize("_20240101.txt"), Err(IngestError::InvalidName(_))));
    }

    #[test]
    fn quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("plan-information"), "\"plan-information\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
