use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// A single cell as delivered by a source, before any schema is applied.
///
/// Delimited text only ever produces `Text` and `Empty`; workbooks carry
/// typed numeric and date cells.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RawCell {
    Empty,
    Text(String),
    Number(f64),
    DateTime(NaiveDateTime),
}

impl RawCell {
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim().is_empty() {
            RawCell::Empty
        } else {
            RawCell::Text(value)
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RawCell::Empty => true,
            RawCell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Renders the cell the way a text column would hold it.
    pub fn as_display(&self) -> String {
        match self {
            RawCell::Empty => String::new(),
            RawCell::Text(s) => s.trim().to_string(),
            RawCell::Number(n) => format_number(*n),
            RawCell::DateTime(dt) => {
                if dt.time() == NaiveTime::default() {
                    format_day_first(dt.date())
                } else {
                    dt.format("%d/%m/%Y %H:%M:%S").to_string()
                }
            }
        }
    }
}

impl fmt::Display for RawCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

static EMPTY_CELL: RawCell = RawCell::Empty;

/// A raw table: one header row plus rows of untyped cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<RawCell>>,
}

impl RawTable {
    /// Builds a table, padding short rows with `Empty` cells.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<RawCell>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                if row.len() < width {
                    row.resize(width, RawCell::Empty);
                }
                row
            })
            .collect();
        Self { headers, rows }
    }

    pub fn from_text_rows(headers: &[&str], rows: &[Vec<&str>]) -> Self {
        Self::new(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|cell| RawCell::text(*cell)).collect())
                .collect(),
        )
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn cell(&self, row: usize, column: usize) -> &RawCell {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(&EMPTY_CELL)
    }
}

/// Outcome of coercing one cell into a typed value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coerced<T> {
    Value(T),
    Missing,
    Invalid,
}

impl<T> Coerced<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Coerced::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Coerced::Invalid)
    }
}

const DAY_FIRST_DATE_FORMATS: &[&str] = &[
    "%d/%m/%y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%Y-%m-%d",
    "%Y/%m/%d",
];

const DAY_FIRST_DATETIME_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parses a date written day-first. A time-of-day suffix is accepted and dropped.
pub fn parse_day_first_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    for fmt in DAY_FIRST_DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(parsed);
        }
    }
    for fmt in DAY_FIRST_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(parsed.date());
        }
    }
    None
}

pub fn coerce_date(cell: &RawCell) -> Coerced<NaiveDate> {
    match cell {
        RawCell::Empty => Coerced::Missing,
        RawCell::DateTime(dt) => Coerced::Value(dt.date()),
        RawCell::Text(s) if s.trim().is_empty() => Coerced::Missing,
        RawCell::Text(s) => match parse_day_first_date(s) {
            Some(date) => Coerced::Value(date),
            None => Coerced::Invalid,
        },
        RawCell::Number(_) => Coerced::Invalid,
    }
}

pub fn coerce_number(cell: &RawCell) -> Coerced<f64> {
    match cell {
        RawCell::Empty => Coerced::Missing,
        RawCell::Number(n) if n.is_finite() => Coerced::Value(*n),
        RawCell::Number(_) => Coerced::Invalid,
        RawCell::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Coerced::Missing;
            }
            match trimmed.parse::<f64>() {
                Ok(parsed) if parsed.is_finite() => Coerced::Value(parsed),
                _ => Coerced::Invalid,
            }
        }
        RawCell::DateTime(_) => Coerced::Invalid,
    }
}

pub fn format_day_first(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Shortest representation that parses back to the same `f64`.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

pub fn format_optional_number(value: Option<f64>) -> String {
    value.map(format_number).unwrap_or_default()
}

/// Two-decimal rendering used for amounts and percentages on screen.
pub fn format_fixed(value: f64) -> String {
    format!("{value:.2}")
}
