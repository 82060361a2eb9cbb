//! Per-file processing: read, resolve the full mark, score every row, and
//! persist the augmented artifact.

use crate::error::{Result, StatError};
use crate::full_mark::{FullMarkProvider, resolve_full_mark};
use crate::output::{derive_output_path, write_table};
use crate::progress::ProgressSink;
use crate::reader::{ReadMode, read_table};
use crate::rules::BucketRules;
use crate::score::clean_score;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Columns appended to every artifact, in this order.
pub const RAW_SCORE_COL: &str = "raw_score";
pub const RATE_COL: &str = "rate";
pub const BUCKET_POINTS_COL: &str = "bucket_points";

/// Resolved column labels for the three cells the engine cares about.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub id: String,
    pub score: String,
}

/// What the engine learned about one input file while processing it.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub columns: Vec<String>,
    pub encoding: String,
    pub full_mark: f64,
    pub output_path: PathBuf,
    pub processed_at: DateTime<Utc>,
}

/// Processes one grade file end to end and returns its descriptor.
///
/// Reads the table through the encoding chain, resolves the file's full
/// mark, verifies the three required columns, computes `raw_score`, `rate`
/// and `bucket_points` for every row, and writes the augmented table to the
/// derived artifact path.
pub fn process_file(
    path: &Path,
    skip_rows: usize,
    columns: &ColumnSpec,
    rules: &BucketRules,
    provider: &dyn FullMarkProvider,
    sink: &dyn ProgressSink,
) -> Result<FileDescriptor> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    sink.log(&format!(
        "processing {file_name} (skipping {skip_rows} leading rows)"
    ));

    let (mut table, encoding) = read_table(path, skip_rows, ReadMode::Full, sink)?;
    let full_mark = resolve_full_mark(&columns.score, &file_name, provider, sink)?;

    for required in [&columns.name, &columns.id] {
        if table.column_index(required).is_none() {
            return Err(StatError::MissingColumn {
                column: required.clone(),
            });
        }
    }
    let score_idx =
        table
            .column_index(&columns.score)
            .ok_or_else(|| StatError::MissingColumn {
                column: columns.score.clone(),
            })?;

    let original_columns = table.headers.clone();
    table.headers.push(RAW_SCORE_COL.to_string());
    table.headers.push(RATE_COL.to_string());
    table.headers.push(BUCKET_POINTS_COL.to_string());

    for row in &mut table.rows {
        let raw_score = clean_score(&row[score_idx]);
        let rate = raw_score / full_mark;
        let bucket_points = rules.points_for_rate(rate);
        row.push(raw_score.to_string());
        row.push(rate.to_string());
        row.push(bucket_points.to_string());
    }
    sink.log(&format!(
        "{file_name}: bucket points computed for {} rows (full mark {full_mark})",
        table.rows.len()
    ));

    let output_path = derive_output_path(path);
    write_table(&output_path, &table)?;
    sink.log(&format!(
        "{file_name}: artifact saved as {}",
        output_path.display()
    ));

    Ok(FileDescriptor {
        path: path.to_path_buf(),
        columns: original_columns,
        encoding,
        full_mark,
        output_path,
        processed_at: Utc::now(),
    })
}

/// Processes a batch of files with per-file failure isolation: one file's
/// error is reported through the sink and the next file is still attempted.
pub fn process_files(
    paths: &[PathBuf],
    skip_rows: usize,
    columns: &ColumnSpec,
    rules: &BucketRules,
    provider: &dyn FullMarkProvider,
    sink: &dyn ProgressSink,
) -> Vec<FileDescriptor> {
    let mut processed = Vec::new();
    for path in paths {
        match process_file(path, skip_rows, columns, rules, provider, sink) {
            Ok(descriptor) => processed.push(descriptor),
            Err(e) => sink.log(&format!("failed to process {}: {e}", path.display())),
        }
    }
    processed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::MemorySink;
    use crate::rules::RateBucket;
    use std::env;
    use std::fs;

    fn rules() -> BucketRules {
        BucketRules::new(vec![
            RateBucket {
                min_rate: 0.0,
                max_rate: 0.59,
                points: 1.0,
            },
            RateBucket {
                min_rate: 0.6,
                max_rate: 1.0,
                points: 2.0,
            },
        ])
        .unwrap()
    }

    fn columns() -> ColumnSpec {
        ColumnSpec {
            name: "姓名".into(),
            id: "学号".into(),
            score: "总分(100)".into(),
        }
    }

    fn no_prompt() -> impl FullMarkProvider {
        |_: &str, _: &str| -> Option<f64> { None }
    }

    #[test]
    fn test_process_appends_three_columns() {
        let path = env::temp_dir().join("score_tally_process_basic.csv");
        fs::write(&path, "姓名,学号,总分(100)\n张三,001,85\n缺考生,002,缺考\n").unwrap();

        let sink = MemorySink::new();
        let descriptor =
            process_file(&path, 0, &columns(), &rules(), &no_prompt(), &sink).unwrap();

        assert_eq!(descriptor.full_mark, 100.0);
        // plain UTF-8 is accepted by the BOM-aware first candidate
        assert_eq!(descriptor.encoding, "utf-8-sig");
        // the descriptor keeps the original columns, without the appended ones
        assert_eq!(descriptor.columns, ["姓名", "学号", "总分(100)"]);
        assert!(descriptor.processed_at <= Utc::now());
        assert_eq!(
            descriptor.output_path,
            env::temp_dir().join("score_tally_process_basic_statd.csv")
        );

        let content = fs::read_to_string(&descriptor.output_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert!(lines[0].ends_with("姓名,学号,总分(100),raw_score,rate,bucket_points"));
        assert_eq!(lines[1], "张三,001,85,85,0.85,2");
        assert_eq!(lines[2], "缺考生,002,缺考,0,0,1");

        fs::remove_file(&path).unwrap();
        fs::remove_file(&descriptor.output_path).unwrap();
    }

    #[test]
    fn test_overwide_rows_contribute_nothing() {
        let path = env::temp_dir().join("score_tally_process_overwide.csv");
        fs::write(
            &path,
            "姓名,学号,总分(100)\n张三,001,85\n李四,002,90,EXTRA\n",
        )
        .unwrap();

        let sink = MemorySink::new();
        let descriptor =
            process_file(&path, 0, &columns(), &rules(), &no_prompt(), &sink).unwrap();

        // the malformed row reaches neither the artifact nor the aggregate
        let content = fs::read_to_string(&descriptor.output_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("张三"));

        fs::remove_file(&path).unwrap();
        fs::remove_file(&descriptor.output_path).unwrap();
    }

    #[test]
    fn test_missing_column_is_reported() {
        let path = env::temp_dir().join("score_tally_process_missing.csv");
        fs::write(&path, "name,总分(100)\na,85\n").unwrap();

        let sink = MemorySink::new();
        let err =
            process_file(&path, 0, &columns(), &rules(), &no_prompt(), &sink).unwrap_err();
        match err {
            StatError::MissingColumn { column } => assert_eq!(column, "姓名"),
            other => panic!("unexpected error: {other}"),
        }

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_batch_continues_past_failures() {
        let good = env::temp_dir().join("score_tally_process_good.csv");
        let bad = env::temp_dir().join("score_tally_process_bad.csv");
        fs::write(&good, "姓名,学号,总分(100)\n张三,001,85\n").unwrap();
        fs::write(&bad, "").unwrap();

        let sink = MemorySink::new();
        let processed = process_files(
            &[bad.clone(), good.clone()],
            0,
            &columns(),
            &rules(),
            &no_prompt(),
            &sink,
        );

        assert_eq!(processed.len(), 1);
        assert_eq!(processed[0].path, good);
        assert!(
            sink.messages()
                .iter()
                .any(|m| m.contains("failed to process"))
        );

        fs::remove_file(&good).unwrap();
        fs::remove_file(&bad).unwrap();
        fs::remove_file(&processed[0].output_path).unwrap();
    }
}
