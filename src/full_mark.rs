//! Full-mark resolution from score column labels.
//!
//! Grade exports usually encode the maximum score in the column label
//! (`总分(100)`, `总分(80,排名)`, `总分80`). When none of the known label
//! shapes match, the engine falls back to an injected [`FullMarkProvider`]
//! and blocks on its answer.

use crate::error::{Result, StatError};
use crate::progress::ProgressSink;
use once_cell::sync::Lazy;
use regex::Regex;

/// Synchronous source for a full mark the engine could not derive itself.
///
/// Implementations must validate that the returned value is positive; `None`
/// means the request was declined and the file cannot be processed.
pub trait FullMarkProvider {
    fn request_full_mark(&self, title: &str, prompt: &str) -> Option<f64>;
}

impl<F> FullMarkProvider for F
where
    F: Fn(&str, &str) -> Option<f64>,
{
    fn request_full_mark(&self, title: &str, prompt: &str) -> Option<f64> {
        self(title, prompt)
    }
}

/// Label shapes tried in order; the first capture wins.
static FULL_MARK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"总分\((\d+\.?\d*)\)",   // 总分(80), 总分(80.0)
        r"总分\((\d+\.?\d*),",    // 总分(80,排名)
        r"总分[^\d]*(\d+\.?\d*)", // 总分80, 总分_80分
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Resolves the full mark for one file from its score column label, falling
/// back to the provider when no pattern matches.
pub fn resolve_full_mark(
    score_label: &str,
    file_name: &str,
    provider: &dyn FullMarkProvider,
    sink: &dyn ProgressSink,
) -> Result<f64> {
    for pattern in FULL_MARK_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(score_label) {
            if let Ok(full_mark) = caps[1].parse::<f64>() {
                sink.log(&format!(
                    "full mark for {file_name} derived from column label {score_label:?}: {full_mark}"
                ));
                return Ok(full_mark);
            }
        }
    }

    let prompt = format!(
        "could not derive the full mark of {file_name} from column label {score_label:?}; \
         enter a value such as 80 or 100"
    );
    match provider.request_full_mark("Full mark required", &prompt) {
        Some(full_mark) if full_mark > 0.0 => {
            sink.log(&format!("full mark for {file_name} supplied manually: {full_mark}"));
            Ok(full_mark)
        }
        // a provider that hands back a non-positive value broke its own
        // contract; refuse the file rather than divide by it
        _ => Err(StatError::UserCancelled),
    }
}
