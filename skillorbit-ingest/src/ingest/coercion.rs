//! Cell type coercion
//!
//! Workbook cells arrive as whatever the spreadsheet decided they were: a
//! date column can hold real date cells, serial numbers, or hand-typed
//! strings; a seat count can be a number or text. Everything here turns a
//! cell into either a value or an explicit absence, never an error.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::cmp::Ordering;
use std::fmt;

/// A single decoded workbook cell
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Int(i64),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
    /// Time-of-day cell with no date part
    Time(NaiveTime),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => write!(f, "None"),
            Cell::Text(s) => write!(f, "'{}'", s),
            Cell::Int(i) => write!(f, "{}", i),
            Cell::Number(n) => write!(f, "{}", format_number(*n)),
            Cell::Bool(b) => write!(f, "{}", b),
            Cell::DateTime(dt) => write!(f, "{}", dt),
            Cell::Time(t) => write!(f, "{}", t),
        }
    }
}

/// Outcome of reading a date-typed field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateCoercion {
    Absent,
    Date(NaiveDate),
    /// A value was present but is not a recognizable date; carries its text
    Unparsable(String),
}

/// Day zero for serials after the phantom 1900-02-29 (1900 date system)
fn excel_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or(NaiveDate::MIN)
}

/// Serial Excel assigns to 1900-02-29, a day that never existed
const PHANTOM_LEAP_DAY: i64 = 60;

/// Largest serial Excel accepts (9999-12-31)
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

/// Date-time layouts tried before date-only layouts
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Date-only layouts; month-first wins over day-first when both parse
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%m-%d-%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%m/%d/%y",
    "%d-%b-%Y",
    "%d-%b-%y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%b %d %Y",
    "%B %d %Y",
    "%Y%m%d",
];

/// `None` for every flavour of missing value: empty cells, blank or
/// whitespace-only text, and NaN numbers
pub fn present(cell: Option<&Cell>) -> Option<&Cell> {
    match cell? {
        Cell::Empty => None,
        Cell::Text(s) if s.trim().is_empty() => None,
        Cell::Number(n) if n.is_nan() => None,
        other => Some(other),
    }
}

/// Trimmed text, or absence
pub fn coerce_text(cell: Option<&Cell>) -> Option<String> {
    let text = match present(cell)? {
        Cell::Empty => return None,
        Cell::Text(s) => s.trim().to_string(),
        Cell::Int(i) => i.to_string(),
        Cell::Number(n) => format_number(*n),
        Cell::Bool(b) => b.to_string(),
        Cell::DateTime(dt) => format_datetime(dt),
        Cell::Time(t) => t.format("%H:%M").to_string(),
    };
    Some(text)
}

/// Numeric field persisted as text: `8` becomes "8", `"20"` stays "20",
/// a missing cell stays absent (never the text "None")
pub fn coerce_numeric_text(cell: Option<&Cell>) -> Option<String> {
    coerce_text(cell)
}

/// Calendar date of a date-like cell; time of day is discarded
pub fn coerce_date(cell: Option<&Cell>) -> DateCoercion {
    let Some(cell) = present(cell) else {
        return DateCoercion::Absent;
    };

    let parsed = match cell {
        Cell::DateTime(dt) => Some(dt.date()),
        Cell::Int(i) => from_excel_serial(*i as f64),
        Cell::Number(n) => from_excel_serial(*n),
        Cell::Text(s) => parse_date_text(s),
        Cell::Empty | Cell::Bool(_) | Cell::Time(_) => None,
    };

    match parsed {
        Some(date) => DateCoercion::Date(date),
        None => DateCoercion::Unparsable(coerce_text(Some(cell)).unwrap_or_default()),
    }
}

/// Permissive date parser for hand-typed date text
pub fn parse_date_text(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok().map(|dt| dt.date()))
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        })
}

fn from_excel_serial(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > MAX_EXCEL_SERIAL {
        return None;
    }
    let days = serial.trunc() as i64;
    match days.cmp(&PHANTOM_LEAP_DAY) {
        // Serial 1 is 1900-01-01, one day later than the shifted epoch gives
        Ordering::Less => excel_epoch().checked_add_signed(Duration::days(days + 1)),
        Ordering::Equal => None,
        Ordering::Greater => excel_epoch().checked_add_signed(Duration::days(days)),
    }
}

/// Whole numbers print without a fractional part
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn format_datetime(dt: &NaiveDateTime) -> String {
    if dt.num_seconds_from_midnight() == 0 && dt.nanosecond() == 0 {
        dt.date().format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}
