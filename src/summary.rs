//! Cross-file aggregation into one ranked summary.
//!
//! Works from the persisted artifacts, not in-memory tables, so a summary
//! can be re-run long after the processing stage without repeating it.

use crate::error::{Result, StatError};
use crate::process::BUCKET_POINTS_COL;
use crate::progress::ProgressSink;
use crate::reader::{ReadMode, read_table};
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name of the summary artifact, written next to the per-file artifacts.
pub const SUMMARY_FILE_NAME: &str = "summary_total_points.csv";

/// Sentinels substituted for blank identity cells so every row still counts.
pub const UNKNOWN_NAME: &str = "未知姓名";
pub const UNKNOWN_ID: &str = "未知学号";

/// One identity's line in the summary.
///
/// `file_count` is the number of files successfully aggregated in this run,
/// shared by every record — not the number of files the identity appears in.
/// The source tool behaves this way and downstream consumers rely on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub name: String,
    pub student_id: String,
    pub file_count: usize,
    pub total_points: f64,
}

/// Aggregates bucket points across artifacts and writes the ranked summary.
///
/// Each artifact is re-read through the encoding chain; one artifact's
/// failure (unreadable, or missing the `bucket_points` column) is reported
/// and skipped. Records are sorted descending by total points with a stable
/// sort, so ties keep their first-seen order. Returns the summary path, or
/// [`StatError::NoData`] when nothing could be aggregated.
pub fn summarize(
    artifacts: &[PathBuf],
    skip_rows: usize,
    name_col: &str,
    id_col: &str,
    sink: &dyn ProgressSink,
) -> Result<PathBuf> {
    // first-seen insertion order is kept so the final sort is reproducible
    let mut totals: Vec<((String, String), f64)> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut file_count = 0usize;

    for artifact in artifacts {
        match aggregate_one(artifact, skip_rows, name_col, id_col, &mut totals, &mut index, sink) {
            Ok(rows) => {
                file_count += 1;
                sink.log(&format!("aggregated {} ({rows} rows)", artifact.display()));
            }
            Err(e) => sink.log(&format!("failed to aggregate {}: {e}", artifact.display())),
        }
    }

    if totals.is_empty() {
        return Err(StatError::NoData);
    }

    let mut records: Vec<SummaryRecord> = totals
        .into_iter()
        .map(|((name, student_id), total)| SummaryRecord {
            name,
            student_id,
            file_count,
            total_points: (total * 100.0).round() / 100.0,
        })
        .collect();
    records.sort_by(|a, b| {
        b.total_points
            .partial_cmp(&a.total_points)
            .unwrap_or(Ordering::Equal)
    });

    let dir = artifacts
        .first()
        .and_then(|p| p.parent())
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let summary_path = dir.join(SUMMARY_FILE_NAME);
    write_summary(&summary_path, &records)?;

    sink.log(&format!(
        "summary of {} students over {file_count} files written to {}",
        records.len(),
        summary_path.display()
    ));
    Ok(summary_path)
}

fn aggregate_one(
    artifact: &Path,
    skip_rows: usize,
    name_col: &str,
    id_col: &str,
    totals: &mut Vec<((String, String), f64)>,
    index: &mut HashMap<(String, String), usize>,
    sink: &dyn ProgressSink,
) -> Result<usize> {
    let (table, _) = read_table(artifact, skip_rows, ReadMode::Full, sink)?;

    let points_idx =
        table
            .column_index(BUCKET_POINTS_COL)
            .ok_or_else(|| StatError::MissingColumn {
                column: BUCKET_POINTS_COL.to_string(),
            })?;
    let name_idx = table
        .column_index(name_col)
        .ok_or_else(|| StatError::MissingColumn {
            column: name_col.to_string(),
        })?;
    let id_idx = table
        .column_index(id_col)
        .ok_or_else(|| StatError::MissingColumn {
            column: id_col.to_string(),
        })?;

    for row in &table.rows {
        let name = identity_cell(&row[name_idx], UNKNOWN_NAME);
        let student_id = identity_cell(&row[id_idx], UNKNOWN_ID);
        let points = row[points_idx].trim().parse::<f64>().unwrap_or(0.0);

        let key = (name, student_id);
        match index.get(&key) {
            Some(&slot) => totals[slot].1 += points,
            None => {
                index.insert(key.clone(), totals.len());
                totals.push((key, points));
            }
        }
    }
    Ok(table.rows.len())
}

fn identity_cell(value: &str, sentinel: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        sentinel.to_string()
    } else {
        trimmed.to_string()
    }
}

fn write_summary(path: &Path, records: &[SummaryRecord]) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all("\u{feff}".as_bytes())?;

    let mut writer = WriterBuilder::new().from_writer(file);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}
