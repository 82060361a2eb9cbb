//! Encoding-resilient table reading.
//!
//! Grade exports arrive in whatever encoding the source system felt like
//! using, so delimited text goes through a fixed candidate chain: BOM-aware
//! UTF-8, plain UTF-8, the two common CJK legacy encodings, a permissive
//! single-byte fallback, and finally a statistically detected guess over the
//! first 4 KiB. The first candidate that decodes without error and yields a
//! header row wins. Spreadsheet files carry their own encoding and bypass
//! the chain entirely.

use crate::error::{Result, StatError};
use crate::progress::ProgressSink;
use calamine::{DataType, Reader, open_workbook_auto};
use chardetng::EncodingDetector;
use encoding_rs::{Encoding, GB18030, GBK, WINDOWS_1252};
use std::fs;
use std::path::Path;

/// Encoding name reported for spreadsheet files, which need no text decoding.
pub const NATIVE_ENCODING: &str = "native";

/// Number of leading bytes sampled for statistical encoding detection.
const DETECT_SAMPLE_BYTES: usize = 4096;

/// A fully materialized table: header labels plus string rows. Rows are
/// padded or truncated to the header width on read.
#[derive(Debug, Clone)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Index of the column with exactly this label.
    pub fn column_index(&self, label: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == label)
    }
}

/// How much of the file a read needs to materialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Only the header row, for column discovery.
    HeaderOnly,
    /// Header plus every data row that parses.
    Full,
}

pub fn is_spreadsheet(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some(ext) if ext.eq_ignore_ascii_case("xlsx") || ext.eq_ignore_ascii_case("xls")
    )
}

/// Reads a tabular file of unknown encoding, returning the table and the
/// name of the encoding that succeeded.
pub fn read_table(
    path: &Path,
    skip_rows: usize,
    mode: ReadMode,
    sink: &dyn ProgressSink,
) -> Result<(Table, String)> {
    if is_spreadsheet(path) {
        let table = read_sheet(path, skip_rows, mode)?;
        return Ok((table, NATIVE_ENCODING.to_string()));
    }
    read_delimited(path, skip_rows, mode, sink)
}

enum Candidate {
    Utf8Sig,
    Utf8,
    Fixed(&'static Encoding),
}

impl Candidate {
    fn name(&self) -> &'static str {
        match self {
            Candidate::Utf8Sig => "utf-8-sig",
            Candidate::Utf8 => "utf-8",
            Candidate::Fixed(enc) => enc.name(),
        }
    }

    /// Strict decode; `None` means this candidate cannot represent the bytes.
    fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            Candidate::Utf8Sig => {
                let stripped = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);
                std::str::from_utf8(stripped).ok().map(str::to_owned)
            }
            Candidate::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_owned),
            Candidate::Fixed(enc) => enc
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|cow| cow.into_owned()),
        }
    }
}

/// The fixed priority chain plus the detector's guess, deduplicated by name
/// while preserving order.
fn encoding_candidates(bytes: &[u8]) -> Vec<Candidate> {
    let mut detector = EncodingDetector::new();
    let sample = &bytes[..bytes.len().min(DETECT_SAMPLE_BYTES)];
    detector.feed(sample, bytes.len() <= DETECT_SAMPLE_BYTES);
    let guessed = detector.guess(None, true);

    let raw = vec![
        Candidate::Utf8Sig,
        Candidate::Utf8,
        Candidate::Fixed(GBK),
        Candidate::Fixed(GB18030),
        Candidate::Fixed(WINDOWS_1252),
        Candidate::Fixed(guessed),
    ];

    let mut seen: Vec<String> = Vec::new();
    let mut candidates = Vec::new();
    for c in raw {
        let name = c.name().to_ascii_lowercase();
        if seen.contains(&name) {
            continue;
        }
        seen.push(name);
        candidates.push(c);
    }
    candidates
}

fn read_delimited(
    path: &Path,
    skip_rows: usize,
    mode: ReadMode,
    sink: &dyn ProgressSink,
) -> Result<(Table, String)> {
    let bytes = fs::read(path)?;
    let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned());
    let file_name = file_name.unwrap_or_else(|| path.display().to_string());

    for candidate in encoding_candidates(&bytes) {
        let Some(text) = candidate.decode(&bytes) else {
            sink.log(&format!(
                "encoding {} cannot decode {file_name}, trying next",
                candidate.name()
            ));
            continue;
        };
        match parse_delimited(&text, skip_rows, mode) {
            Some(table) => {
                sink.log(&format!(
                    "read {file_name} with encoding {}",
                    candidate.name()
                ));
                return Ok((table, candidate.name().to_string()));
            }
            None => {
                sink.log(&format!(
                    "encoding {} produced no header row for {file_name}, trying next",
                    candidate.name()
                ));
            }
        }
    }

    Err(StatError::UnreadableFile {
        path: path.to_path_buf(),
    })
}

/// Parses decoded text into a table. `None` when no header row materializes
/// (empty input, or `skip_rows` past the end). On full reads, rows that fail
/// structural parsing — including rows wider than the header — are skipped
/// rather than failing the candidate; short rows are padded with empty
/// cells.
fn parse_delimited(text: &str, skip_rows: usize, mode: ReadMode) -> Option<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut records = reader.records();

    for _ in 0..skip_rows {
        records.next()?;
    }

    let headers: Vec<String> = match records.next() {
        Some(Ok(record)) => record.iter().map(str::to_owned).collect(),
        _ => return None,
    };
    if headers.iter().all(|h| h.is_empty()) {
        return None;
    }

    let mut table = Table {
        headers,
        rows: Vec::new(),
    };
    if mode == ReadMode::HeaderOnly {
        return Some(table);
    }

    for record in records {
        let Ok(record) = record else { continue };
        // a row wider than the header is structurally malformed
        if record.len() > table.headers.len() {
            continue;
        }
        let mut row: Vec<String> = record.iter().map(str::to_owned).collect();
        row.resize(table.headers.len(), String::new());
        table.rows.push(row);
    }
    Some(table)
}

fn read_sheet(path: &Path, skip_rows: usize, mode: ReadMode) -> Result<Table> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| StatError::Spreadsheet(format!("{} has no worksheets", path.display())))??;

    let mut rows = range.rows().skip(skip_rows);
    let headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row.iter().map(cell_to_string).collect(),
        None => {
            return Err(StatError::Spreadsheet(format!(
                "{} has no header row",
                path.display()
            )));
        }
    };

    let mut table = Table {
        headers,
        rows: Vec::new(),
    };
    if mode == ReadMode::HeaderOnly {
        return Ok(table);
    }

    for sheet_row in rows {
        let mut row: Vec<String> = sheet_row.iter().map(cell_to_string).collect();
        row.resize(table.headers.len(), String::new());
        table.rows.push(row);
    }
    Ok(table)
}

fn cell_to_string(cell: &calamine::Data) -> String {
    if cell.is_empty() {
        return String::new();
    }
    cell.as_string().unwrap_or_else(|| cell.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::MemorySink;
    use std::env;
    use std::fs;

    fn temp_file(name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = env::temp_dir().join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_utf8_bom_is_stripped_from_header() {
        let path = temp_file(
            "score_tally_reader_bom.csv",
            "\u{feff}姓名,学号,总分(100)\n张三,001,85\n".as_bytes(),
        );
        let sink = MemorySink::new();
        let (table, encoding) = read_table(&path, 0, ReadMode::Full, &sink).unwrap();

        assert_eq!(encoding, "utf-8-sig");
        assert_eq!(table.headers[0], "姓名");
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0][2], "85");

        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_gbk_file_is_decoded() {
        let text = "姓名,学号,总分(100)\n张三,001,90\n";
        let (encoded, _, _) = encoding_rs::GBK.encode(text);
        let path = temp_file("score_tally_reader_gbk.csv", &encoded);

        let sink = MemorySink::new();
        let (table, encoding) = read_table(&path, 0, ReadMode::Full, &sink).unwrap();

        assert_eq!(encoding, "GBK");
        assert_eq!(table.headers[2], "总分(100)");
        assert_eq!(table.rows[0][0], "张三");

        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_skip_rows_reaches_header() {
        let path = temp_file(
            "score_tally_reader_skip.csv",
            b"export v2\ngenerated yesterday\nname,id,score\na,1,50\n",
        );
        let sink = MemorySink::new();
        let (table, _) = read_table(&path, 2, ReadMode::Full, &sink).unwrap();

        assert_eq!(table.headers, vec!["name", "id", "score"]);
        assert_eq!(table.rows.len(), 1);

        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_header_only_reads_no_rows() {
        let path = temp_file(
            "score_tally_reader_header_only.csv",
            b"name,id,score\na,1,50\nb,2,60\n",
        );
        let sink = MemorySink::new();
        let (table, _) = read_table(&path, 0, ReadMode::HeaderOnly, &sink).unwrap();

        assert_eq!(table.headers.len(), 3);
        assert!(table.rows.is_empty());

        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_short_rows_are_padded() {
        let path = temp_file(
            "score_tally_reader_ragged.csv",
            b"name,id,score\nonly-name\n",
        );
        let sink = MemorySink::new();
        let (table, _) = read_table(&path, 0, ReadMode::Full, &sink).unwrap();

        assert_eq!(table.rows[0], vec!["only-name", "", ""]);

        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_overwide_rows_are_skipped() {
        let path = temp_file(
            "score_tally_reader_overwide.csv",
            "姓名,学号,总分(100)\n张三,001,85\n李四,002,90,EXTRA\n".as_bytes(),
        );
        let sink = MemorySink::new();
        let (table, _) = read_table(&path, 0, ReadMode::Full, &sink).unwrap();

        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0][0], "张三");

        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_empty_file_is_unreadable() {
        let path = temp_file("score_tally_reader_empty.csv", b"");
        let sink = MemorySink::new();
        let err = read_table(&path, 0, ReadMode::Full, &sink).unwrap_err();
        assert!(matches!(err, StatError::UnreadableFile { .. }));

        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_skip_past_end_is_unreadable() {
        let path = temp_file("score_tally_reader_skip_past.csv", b"name,id\n");
        let sink = MemorySink::new();
        let err = read_table(&path, 5, ReadMode::Full, &sink).unwrap_err();
        assert!(matches!(err, StatError::UnreadableFile { .. }));

        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_candidate_chain_is_deduplicated() {
        let candidates = encoding_candidates(b"name,id\n");
        let names: Vec<&str> = candidates.iter().map(|c| c.name()).collect();
        let mut lowered: Vec<String> = names.iter().map(|n| n.to_ascii_lowercase()).collect();
        lowered.sort();
        let before = lowered.len();
        lowered.dedup();
        assert_eq!(before, lowered.len());
        assert_eq!(names[0], "utf-8-sig");
        assert_eq!(names[1], "utf-8");
    }

    #[test]
    fn test_column_index_is_exact_match() {
        let table = Table {
            headers: vec!["姓名".into(), "总分(100)".into()],
            rows: vec![],
        };
        assert_eq!(table.column_index("总分(100)"), Some(1));
        assert_eq!(table.column_index("总分"), None);
    }
}
