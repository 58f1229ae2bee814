//! Workbook source reading
//!
//! The source is one seekable byte stream holding both catalog sheets. Each
//! sheet is read on its own pass: rewind to the start, open the workbook,
//! pull the sheet fully into memory. Nothing assumes random access between
//! sheets.

use std::io::{Read, Seek, SeekFrom};

use calamine::{Data, ExcelDateTime, Range, Reader, Xls, Xlsx};
use tracing::debug;

use super::coercion::{coerce_text, Cell};
use super::headers::normalize_headers;
use super::mapper::RawRow;
use crate::error::IngestionError;

/// Sheet holding the trainer roster
pub const TRAINERS_SHEET: &str = "Trainers Details";
/// Sheet holding the training catalog
pub const TRAININGS_SHEET: &str = "Training Details";

const XLSX_MAGIC: &[u8] = b"PK\x03\x04";
const XLS_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Container format, detected from leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkbookFormat {
    Xlsx,
    Xls,
}

/// One sheet pulled fully into memory
#[derive(Debug, Clone, PartialEq)]
pub struct SheetData {
    pub name: String,
    /// Normalized header row
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

/// Rewind `source` and sniff its container format
pub fn detect_format<RS: Read + Seek>(source: &mut RS) -> Result<WorkbookFormat, IngestionError> {
    source.seek(SeekFrom::Start(0))?;

    let mut magic = [0u8; 8];
    let mut filled = 0;
    while filled < magic.len() {
        let n = source.read(&mut magic[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    source.seek(SeekFrom::Start(0))?;

    let magic = &magic[..filled];
    if magic.starts_with(XLSX_MAGIC) {
        Ok(WorkbookFormat::Xlsx)
    } else if magic.starts_with(XLS_MAGIC) {
        Ok(WorkbookFormat::Xls)
    } else {
        Err(IngestionError::SourceRead(
            "source is neither an .xlsx nor an .xls workbook".to_string(),
        ))
    }
}

/// Read one named sheet, starting from the beginning of `source`
pub fn read_sheet<RS: Read + Seek>(
    source: &mut RS,
    sheet: &str,
) -> Result<SheetData, IngestionError> {
    let range = match detect_format(source)? {
        WorkbookFormat::Xlsx => {
            let mut workbook = Xlsx::new(&mut *source)
                .map_err(|e| IngestionError::SourceRead(e.to_string()))?;
            sheet_range(&mut workbook, sheet)?
        }
        WorkbookFormat::Xls => {
            let mut workbook = Xls::new(&mut *source)
                .map_err(|e| IngestionError::SourceRead(e.to_string()))?;
            sheet_range(&mut workbook, sheet)?
        }
    };

    let data = sheet_from_range(sheet, &range);
    debug!(sheet, rows = data.rows.len(), "Read sheet");
    Ok(data)
}

fn sheet_range<RS, W>(workbook: &mut W, sheet: &str) -> Result<Range<Data>, IngestionError>
where
    RS: Read + Seek,
    W: Reader<RS>,
    W::Error: std::fmt::Display,
{
    if !workbook.sheet_names().iter().any(|name| name == sheet) {
        return Err(IngestionError::SheetMissing(sheet.to_string()));
    }

    workbook
        .worksheet_range(sheet)
        .map_err(|e| IngestionError::SourceRead(format!("sheet '{}': {}", sheet, e)))
}

/// First row is the header; every later row becomes a `RawRow`
fn sheet_from_range(sheet: &str, range: &Range<Data>) -> SheetData {
    // The range starts at the first used row, which may not be row 1
    let header_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);

    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(header_cells) => normalize_headers(
            header_cells
                .iter()
                .map(|c| coerce_text(Some(&to_cell(c))).unwrap_or_default()),
        ),
        None => Vec::new(),
    };

    let rows = rows
        .enumerate()
        .map(|(i, cells)| {
            let position = header_row + i + 2;
            RawRow::new(position, &headers, cells.iter().map(to_cell).collect())
        })
        .collect();

    SheetData {
        name: sheet.to_string(),
        headers,
        rows,
    }
}

/// Decode a calamine cell; error cells count as missing
pub fn to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Int(i) => Cell::Int(*i),
        Data::Float(f) => Cell::Number(*f),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => excel_datetime_cell(dt),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}

fn excel_datetime_cell(dt: &ExcelDateTime) -> Cell {
    if dt.is_duration() {
        return Cell::Number(dt.as_f64());
    }
    match dt.as_datetime() {
        Some(naive) if dt.as_f64() < 1.0 => Cell::Time(naive.time()),
        Some(naive) => Cell::DateTime(naive),
        None => Cell::Number(dt.as_f64()),
    }
}
