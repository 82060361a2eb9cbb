//! Artifact persistence.
//!
//! Per-file artifacts keep the format family of their input (delimited text
//! stays text, spreadsheets stay spreadsheets). Text artifacts are always
//! written as UTF-8 with a BOM so downstream consumers never have to guess,
//! whatever encoding the input arrived in.

use crate::error::Result;
use crate::reader::{Table, is_spreadsheet};
use csv::WriterBuilder;
use rust_xlsxwriter::Workbook;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Suffix inserted before the extension of every per-file artifact.
pub const OUTPUT_SUFFIX: &str = "_statd";

/// Derives the artifact path for an input file: `a/b.csv` -> `a/b_statd.csv`.
pub fn derive_output_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match path.extension() {
        Some(ext) => format!("{stem}{OUTPUT_SUFFIX}.{}", ext.to_string_lossy()),
        None => format!("{stem}{OUTPUT_SUFFIX}"),
    };
    path.with_file_name(file_name)
}

/// Writes a table to `path`, choosing the writer from the extension.
pub fn write_table(path: &Path, table: &Table) -> Result<()> {
    if is_spreadsheet(path) {
        write_sheet(path, table)
    } else {
        write_csv(path, table)
    }
}

fn write_csv(path: &Path, table: &Table) -> Result<()> {
    let mut file = File::create(path)?;
    // BOM first, so spreadsheet software opens the CJK text correctly
    file.write_all("\u{feff}".as_bytes())?;

    let mut writer = WriterBuilder::new().flexible(true).from_writer(file);
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_sheet(path: &Path, table: &Table) -> Result<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    for (col, header) in table.headers.iter().enumerate() {
        worksheet.write_string(0, col as u16, header)?;
    }
    for (row_idx, row) in table.rows.iter().enumerate() {
        for (col, value) in row.iter().enumerate() {
            worksheet.write_string(row_idx as u32 + 1, col as u16, value)?;
        }
    }

    workbook.save(path)?;
    Ok(())
}
