//! Error types for the statistics engine.
//!
//! Every failure kind that the per-file and aggregation boundaries need to
//! distinguish gets its own variant; I/O and format errors from the
//! underlying crates are carried through transparently.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatError {
    /// Every encoding candidate failed to produce a parseable table.
    #[error("no encoding candidate could read {path}")]
    UnreadableFile { path: PathBuf },

    /// A required column label is absent from a table.
    #[error("required column not found: {column}")]
    MissingColumn { column: String },

    /// The full-mark provider returned no usable value.
    #[error("full mark entry cancelled")]
    UserCancelled,

    /// A rate interval is malformed. Validated before any file is touched.
    #[error("invalid bucket rule: {0}")]
    InvalidRule(String),

    /// Aggregation finished without a single identity.
    #[error("no rows could be aggregated")]
    NoData,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(String),
}

impl From<calamine::Error> for StatError {
    fn from(e: calamine::Error) -> Self {
        StatError::Spreadsheet(e.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for StatError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        StatError::Spreadsheet(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StatError>;
