//! Raw score cell normalization.

use once_cell::sync::Lazy;
use regex::Regex;

/// Cell values meaning the student did not sit the exam.
const ABSENT_MARKERS: &[&str] = &["未开考", "缺考"];

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+\.?\d*)").unwrap());

/// Converts an arbitrary raw score cell into a numeric score.
///
/// Total function: empty cells, absence markers, and anything that yields no
/// parseable number all map to `0.0`. Otherwise the first digit run
/// (optionally with a decimal point) found anywhere in the cell is used, so
/// values like `"85.5分"` still parse.
pub fn clean_score(value: &str) -> f64 {
    let trimmed = value.trim();
    if trimmed.is_empty() || ABSENT_MARKERS.contains(&trimmed) {
        return 0.0;
    }

    NUMBER
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(0.0)
}
