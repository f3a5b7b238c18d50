//! Delimited-text reader
//!
//! Spreadsheet exports arrive as CSV or TSV with a header row. The reader
//! strips a UTF-8 BOM, trims cells, skips fully blank rows (counting them) and
//! keeps the source line number of every data row for diagnostics.

use crate::error::{EtlError, EtlResult};
use std::path::Path;
use tracing::debug;

const UTF8_BOM: char = '\u{feff}';

/// One data row, cells aligned with the header
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// 1-based source line
    pub line: usize,
    pub values: Vec<String>,
}

impl RawRecord {
    /// Trimmed, non-empty cell
    pub fn cell(&self, index: usize) -> Option<&str> {
        self.values
            .get(index)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Parsed sheet
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRecord>,
    /// Fully blank rows dropped while reading
    pub skipped: usize,
}

/// Delimiter for a file, chosen by extension
pub fn delimiter_for(path: &Path) -> u8 {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("tsv") | Some("tab") => b'\t',
        _ => b',',
    }
}

/// Read a CSV/TSV file
pub fn read_table(path: &Path) -> EtlResult<RawTable> {
    if !path.is_file() {
        return Err(EtlError::Configuration(format!(
            "Input file not found: {}",
            path.display()
        )));
    }
    let bytes = std::fs::read(path)?;
    let content = String::from_utf8_lossy(&bytes);
    let table = parse_table(&content, delimiter_for(path))?;
    debug!(
        file = %path.display(),
        rows = table.rows.len(),
        skipped = table.skipped,
        "Read input table"
    );
    Ok(table)
}

/// Parse delimited text held in memory
pub fn parse_table(content: &str, delimiter: u8) -> EtlResult<RawTable> {
    let content = content.strip_prefix(UTF8_BOM).unwrap_or(content);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches(UTF8_BOM).trim().to_string())
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    let mut skipped = 0;
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            skipped += 1;
            continue;
        }
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(rows.len() + skipped + 2);
        let mut values: Vec<String> = record.iter().map(str::to_string).collect();
        values.resize(headers.len().max(values.len()), String::new());
        rows.push(RawRecord { line, values });
    }

    Ok(RawTable {
        headers,
        rows,
        skipped,
    })
}
