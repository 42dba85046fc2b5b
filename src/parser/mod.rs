//! CSV reading and writing with encoding and delimiter auto-detection.
//!
//! Converts CSV files into [`Dataset`]s and writes augmented datasets back
//! out preserving column order. No generation logic here.

use std::path::Path;

use crate::error::{CsvError, CsvResult};
use crate::model::{Dataset, Row};

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Parsed dataset
    pub dataset: Dataset,
    /// Detected or used encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> CsvResult<String> {
    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => Ok(String::from_utf8_lossy(bytes).to_string()),
        "iso-8859-1" | "latin-1" | "latin1" => {
            Ok(encoding_rs::ISO_8859_15.decode(bytes).0.to_string())
        }
        "windows-1252" | "cp1252" => Ok(encoding_rs::WINDOWS_1252.decode(bytes).0.to_string()),
        _ => {
            // Fallback: UTF-8 with lossy conversion
            Ok(String::from_utf8_lossy(bytes).to_string())
        }
    }
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [';', ',', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse CSV text into a dataset with an explicit delimiter.
///
/// Rows shorter than the header are filled with empty cells; extra trailing
/// fields are ignored.
pub fn parse_csv(content: &str, delimiter: char) -> CsvResult<Dataset> {
    if content.trim().is_empty() {
        return Err(CsvError::EmptyFile);
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err(CsvError::NoHeaders);
    }

    let mut dataset = Dataset::new(headers.clone());
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        let mut row = Row::new();
        for (i, header) in headers.iter().enumerate() {
            row.set_cell(header, record.get(i).unwrap_or(""));
        }
        dataset.rows.push(row);
    }

    Ok(dataset)
}

/// Parse raw bytes with encoding and delimiter auto-detection.
pub fn parse_bytes_auto(bytes: &[u8]) -> CsvResult<ParseResult> {
    if bytes.is_empty() {
        return Err(CsvError::EmptyFile);
    }

    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = detect_delimiter(&content);
    let dataset = parse_csv(&content, delimiter)?;

    Ok(ParseResult {
        dataset,
        encoding,
        delimiter,
    })
}

/// Parse a CSV file with auto-detection.
pub fn parse_csv_file_auto(path: &Path) -> CsvResult<ParseResult> {
    let bytes = std::fs::read(path)?;
    parse_bytes_auto(&bytes)
}

/// Write a dataset to CSV text, preserving catalog column order.
/// Missing cells are written as empty fields.
pub fn write_csv(dataset: &Dataset, delimiter: char) -> CsvResult<String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter as u8)
        .from_writer(Vec::new());

    writer.write_record(&dataset.columns)?;
    for row in &dataset.rows {
        let record: Vec<&str> = dataset.columns.iter().map(|c| row.cell(c)).collect();
        writer.write_record(&record)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| CsvError::ParseError(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| CsvError::EncodingError(e.to_string()))
}

/// Write a dataset to a CSV file.
pub fn write_csv_file(dataset: &Dataset, path: &Path, delimiter: char) -> CsvResult<()> {
    let content = write_csv(dataset, delimiter)?;
    std::fs::write(path, content)?;
    Ok(())
}
