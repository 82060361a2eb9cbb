//! CLI entry point for the score statistics tool.
//!
//! Provides subcommands for adding bucketed statistics columns to grade
//! export files and for merging the resulting artifacts into one ranked
//! summary.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use score_tally::full_mark::FullMarkProvider;
use score_tally::output::OUTPUT_SUFFIX;
use score_tally::process::{ColumnSpec, process_files};
use score_tally::progress::{ProgressSink, TracingSink};
use score_tally::reader::{ReadMode, is_spreadsheet, read_table};
use score_tally::rules::{BucketRules, RateBucket};
use score_tally::summary::{SUMMARY_FILE_NAME, summarize};
use std::ffi::OsStr;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "score_tally")]
#[command(about = "Bucketed score statistics over grade export files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append raw_score/rate/bucket_points columns to each grade file
    Process {
        /// Grade export files (csv/xlsx/xls)
        #[arg(value_name = "FILE")]
        files: Vec<PathBuf>,

        /// Folder to scan for grade files (non-recursive)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Leading rows to skip before the header row
        #[arg(long, default_value_t = 0)]
        skip_rows: usize,

        /// Column label holding student names (auto-matched when omitted)
        #[arg(long)]
        name_col: Option<String>,

        /// Column label holding student ids (auto-matched when omitted)
        #[arg(long)]
        id_col: Option<String>,

        /// Column label holding total scores (auto-matched when omitted)
        #[arg(long)]
        score_col: Option<String>,

        /// Rate interval mapped to points, as MIN,MAX,POINTS. Repeatable;
        /// order matters, the first matching interval wins.
        #[arg(long = "bucket", value_name = "MIN,MAX,POINTS")]
        buckets: Vec<RateBucket>,

        /// JSON file holding an array of {min_rate, max_rate, points} rules
        #[arg(long, conflicts_with = "buckets")]
        rules_file: Option<PathBuf>,

        /// Full mark to use whenever it cannot be derived from the score
        /// column label (otherwise the tool prompts on the terminal)
        #[arg(long)]
        full_mark: Option<f64>,
    },
    /// Merge processed artifacts into one ranked summary
    Summarize {
        /// Artifact files produced by `process`
        #[arg(value_name = "ARTIFACT")]
        artifacts: Vec<PathBuf>,

        /// Folder to scan for artifacts (non-recursive)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Leading rows to skip before the header row
        #[arg(long, default_value_t = 0)]
        skip_rows: usize,

        /// Column label holding student names (auto-matched when omitted)
        #[arg(long)]
        name_col: Option<String>,

        /// Column label holding student ids (auto-matched when omitted)
        #[arg(long)]
        id_col: Option<String>,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/score_tally.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("score_tally.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let sink = TracingSink;

    match cli.command {
        Commands::Process {
            files,
            dir,
            skip_rows,
            name_col,
            id_col,
            score_col,
            buckets,
            rules_file,
            full_mark,
        } => {
            let inputs = collect_inputs(files, dir.as_deref(), false)?;
            if inputs.is_empty() {
                bail!("no grade files to process; pass FILE arguments or --dir");
            }

            // Rules are validated before any file is touched
            let buckets = match rules_file {
                Some(path) => load_rules_file(&path)?,
                None => buckets,
            };
            if buckets.is_empty() {
                bail!("no bucket rules given; pass --bucket MIN,MAX,POINTS at least once");
            }
            let rules = BucketRules::new(buckets).context("bucket rules rejected")?;
            info!(rule_count = rules.len(), "bucket rules accepted");

            let columns = resolve_columns(
                &inputs[0],
                skip_rows,
                [
                    (name_col, "姓名"),
                    (id_col, "学号"),
                    (score_col, "总分"),
                ],
                &sink,
            )?;
            let columns = ColumnSpec {
                name: columns[0].clone(),
                id: columns[1].clone(),
                score: columns[2].clone(),
            };

            let processed = if let Some(mark) = full_mark {
                if mark <= 0.0 {
                    bail!("--full-mark must be greater than zero");
                }
                let provider = move |_: &str, _: &str| Some(mark);
                process_files(&inputs, skip_rows, &columns, &rules, &provider, &sink)
            } else {
                process_files(&inputs, skip_rows, &columns, &rules, &StdinFullMark, &sink)
            };

            if processed.is_empty() {
                bail!("none of the {} files could be processed", inputs.len());
            }
            println!(
                "Processed {} of {} files:",
                processed.len(),
                inputs.len()
            );
            for descriptor in &processed {
                println!(
                    "- [{}] {} ({} columns, encoding {}, full mark {}) -> {}",
                    descriptor.processed_at.format("%H:%M:%S"),
                    descriptor.path.display(),
                    descriptor.columns.len(),
                    descriptor.encoding,
                    descriptor.full_mark,
                    descriptor.output_path.display()
                );
            }
        }
        Commands::Summarize {
            artifacts,
            dir,
            skip_rows,
            name_col,
            id_col,
        } => {
            let artifacts = collect_inputs(artifacts, dir.as_deref(), true)?;
            if artifacts.is_empty() {
                bail!("no artifacts to summarize; pass ARTIFACT arguments or --dir");
            }

            let columns = resolve_columns(
                &artifacts[0],
                skip_rows,
                [(name_col, "姓名"), (id_col, "学号")],
                &sink,
            )?;

            let summary_path = summarize(&artifacts, skip_rows, &columns[0], &columns[1], &sink)?;
            println!("Summary written to {}.", summary_path.display());
        }
    }

    Ok(())
}

/// Merges explicit paths with a folder scan, deduplicated, folder entries in
/// name order. With `artifacts_only`, keeps only `_statd` outputs and never
/// picks up a previous summary file.
fn collect_inputs(
    explicit: Vec<PathBuf>,
    dir: Option<&Path>,
    artifacts_only: bool,
) -> Result<Vec<PathBuf>> {
    let mut inputs = explicit;

    if let Some(dir) = dir {
        let mut found = Vec::new();
        for entry in
            fs::read_dir(dir).with_context(|| format!("cannot read folder {}", dir.display()))?
        {
            let path = entry?.path();
            if !path.is_file() || !is_tabular(&path) {
                continue;
            }
            if artifacts_only && !is_artifact(&path) {
                continue;
            }
            found.push(path);
        }
        found.sort();
        for path in found {
            if !inputs.contains(&path) {
                inputs.push(path);
            }
        }
    }

    Ok(inputs)
}

fn is_tabular(path: &Path) -> bool {
    is_spreadsheet(path)
        || matches!(
            path.extension().and_then(|e| e.to_str()),
            Some(ext) if ext.eq_ignore_ascii_case("csv")
        )
}

fn is_artifact(path: &Path) -> bool {
    if path.file_name().and_then(|n| n.to_str()) == Some(SUMMARY_FILE_NAME) {
        return false;
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.ends_with(OUTPUT_SUFFIX))
}

fn load_rules_file(path: &Path) -> Result<Vec<RateBucket>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("cannot read rules file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("malformed rules file {}", path.display()))
}

/// Resolves column labels, auto-matching omitted ones against the first
/// file's header: the first label containing the token wins.
fn resolve_columns<const N: usize>(
    first_file: &Path,
    skip_rows: usize,
    wanted: [(Option<String>, &str); N],
    sink: &dyn ProgressSink,
) -> Result<[String; N]> {
    let needs_header = wanted.iter().any(|(explicit, _)| explicit.is_none());
    let headers = if needs_header {
        let (table, _) = read_table(first_file, skip_rows, ReadMode::HeaderOnly, sink)
            .with_context(|| format!("cannot inspect columns of {}", first_file.display()))?;
        table.headers
    } else {
        Vec::new()
    };

    let mut resolved = Vec::with_capacity(N);
    for (explicit, token) in wanted {
        match explicit {
            Some(label) => resolved.push(label),
            None => {
                let matched = headers
                    .iter()
                    .find(|h| h.contains(token))
                    .cloned()
                    .with_context(|| {
                        format!(
                            "no column label containing {token:?} in {}; pass it explicitly",
                            first_file.display()
                        )
                    })?;
                sink.log(&format!("auto-matched {token} column: {matched}"));
                resolved.push(matched);
            }
        }
    }

    // length is N by construction
    Ok(resolved
        .try_into()
        .unwrap_or_else(|_| unreachable!("resolved {N} columns")))
}

/// Prompts the operator on the terminal for a full mark. Empty input or EOF
/// declines the request for that file.
struct StdinFullMark;

impl FullMarkProvider for StdinFullMark {
    fn request_full_mark(&self, title: &str, prompt: &str) -> Option<f64> {
        eprintln!("{title}: {prompt}");
        let stdin = io::stdin();
        loop {
            eprint!("> ");
            let _ = io::stderr().flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => return None,
                Ok(_) => {}
            }
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            match line.parse::<f64>() {
                Ok(mark) if mark > 0.0 => return Some(mark),
                _ => eprintln!("enter a number greater than zero, or leave empty to skip"),
            }
        }
    }
}
