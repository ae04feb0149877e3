//! Raw-text normalization for individual talk fields.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use super::FieldError;
use crate::session::Element;

static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]+").unwrap());

const DATE_SEPARATOR: &str = "| ";
const TRANSLATIONS_UNIT: &str = " languages";

/// "1,234,567" → "1234567". The residue is not required to be numeric.
pub fn views(raw: &str) -> String {
    raw.replace(',', "")
}

/// "| March 2015" → 2015-03-01. The source only carries month and year.
pub fn date(raw: &str) -> Result<NaiveDate, FieldError> {
    let cleaned = raw.replace(DATE_SEPARATOR, "");
    NaiveDate::parse_from_str(&format!("1 {}", cleaned.trim()), "%d %B %Y")
        .map_err(|e| FieldError::parse(raw, e))
}

/// Tag panel text: first line is the panel header, last line the close control.
pub fn tags(panel: &str) -> Result<Vec<String>, FieldError> {
    let mut lines: Vec<String> = panel.split('\n').skip(1).map(str::to_string).collect();
    lines
        .pop()
        .ok_or_else(|| FieldError::parse(panel, "no entries after the header"))?;
    Ok(lines)
}

/// "42 languages" → "42".
pub fn translations(raw: &str) -> String {
    raw.replace(TRANSLATIONS_UNIT, "")
}

/// "Comments (42)" → "42".
pub fn comments(raw: &str) -> Result<String, FieldError> {
    DIGITS_RE
        .find(raw)
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| FieldError::parse(raw, "no digits"))
}

pub fn transcript(lines: &[Element]) -> String {
    lines
        .iter()
        .map(Element::text)
        .collect::<Vec<_>>()
        .join(" ")
}
