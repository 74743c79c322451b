//! Turns report files into `RawRow`s. CSV streams; spreadsheets load the
//! first sheet in full.

use crate::constants::{CANONICAL_DATE_FORMAT, REPORT_EXTENSIONS};
use crate::error::{DashboardError, Result};
use crate::pipeline::mapper::RawRow;
use calamine::{open_workbook_auto, Data, Reader};
use chrono::NaiveDate;
use std::borrow::Cow;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Csv,
    Spreadsheet,
}

impl ReportFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => Ok(ReportFormat::Csv),
            "xlsx" | "xls" => Ok(ReportFormat::Spreadsheet),
            _ => Err(DashboardError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// True for files the inbox sweep should pick up.
pub fn is_report_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| REPORT_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Wrap `reader` so a leading UTF-8 byte-order mark never reaches the parser.
pub fn strip_bom<R: Read>(reader: R) -> Result<BufReader<R>> {
    let mut buffered = BufReader::new(reader);
    let starts_with_bom = buffered.fill_buf()?.starts_with(UTF8_BOM);
    if starts_with_bom {
        buffered.consume(UTF8_BOM.len());
    }
    Ok(buffered)
}

/// Streaming CSV rows keyed by the header line. Fields that are not valid
/// UTF-8 (Latin-1 exports) are decoded lossily.
pub struct CsvRows<R: Read> {
    headers: Vec<String>,
    records: csv::ByteRecordsIntoIter<BufReader<R>>,
}

impl<R: Read> CsvRows<R> {
    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl<R: Read> Iterator for CsvRows<R> {
    type Item = Result<RawRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        Some(
            record
                .map(|r| {
                    let values: Vec<Cow<'_, str>> = r.iter().map(String::from_utf8_lossy).collect();
                    RawRow::from_header(&self.headers, values.iter().map(|v| v.as_ref()))
                })
                .map_err(DashboardError::from),
        )
    }
}

pub fn csv_rows<R: Read>(reader: R) -> Result<CsvRows<R>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(strip_bom(reader)?);
    let headers = csv_reader
        .byte_headers()?
        .iter()
        .map(|h| String::from_utf8_lossy(h).into_owned())
        .collect();
    Ok(CsvRows {
        headers,
        records: csv_reader.into_byte_records(),
    })
}

/// A bad record that the reader can step past. I/O failures end the file.
pub fn is_skippable_row_error(err: &DashboardError) -> bool {
    matches!(err, DashboardError::Csv(e) if !e.is_io_error())
}

/// First worksheet, first row as header.
pub fn spreadsheet_rows(path: &Path) -> Result<Vec<RawRow>> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| DashboardError::UnsupportedFormat(format!(
            "{} has no worksheets",
            path.display()
        )))??;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(cell_to_string).collect(),
        None => return Ok(Vec::new()),
    };

    Ok(rows
        .map(|cells| {
            let values: Vec<String> = cells.iter().map(cell_to_string).collect();
            RawRow::from_header(&headers, values.iter().map(String::as_str))
        })
        .collect())
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
                format!("{:.0}", f)
            } else {
                f.to_string()
            }
        }
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.date().format(CANONICAL_DATE_FORMAT).to_string())
            .unwrap_or_else(|| dt.as_f64().to_string()),
        Data::DateTimeIso(s) => s
            .get(..10)
            .and_then(|day| NaiveDate::parse_from_str(day, CANONICAL_DATE_FORMAT).ok())
            .map(|d| d.format(CANONICAL_DATE_FORMAT).to_string())
            .unwrap_or_else(|| s.clone()),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERROR:{:?}", e),
    }
}
