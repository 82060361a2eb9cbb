//! Bucketed score statistics over heterogeneous grade export files.
//!
//! The engine reads tabular grade exports of unknown encoding, normalizes
//! each raw score into a score rate against that file's full mark, maps the
//! rate to a point value through caller-defined rate intervals, persists an
//! augmented artifact per file, and aggregates the artifacts into one ranked
//! per-student summary.

pub mod error;
pub mod full_mark;
pub mod output;
pub mod process;
pub mod progress;
pub mod reader;
pub mod rules;
pub mod score;
pub mod summary;
