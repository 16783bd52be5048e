#![forbid(unsafe_code)]

mod store;

use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use csv::ReaderBuilder;
use lf_columnar::{Column, ColumnError};
use lf_frame::{DataFrame, FrameError};
use lf_types::{DType, HeaderRole, NullKind, Scalar, parse_datetime_text};
use thiserror::Error;
use tracing::{debug, info};

pub use store::{RuleStore, StoreError, StoredRule};

/// Share of non-null cells that must convert before a text column is promoted.
pub const PROMOTION_THRESHOLD: f64 = 0.5;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("input has no header row")]
    MissingHeaders,
    #[error("workbook has no worksheet")]
    NoWorksheet,
    #[error("invalid file: {0}")]
    Workbook(#[from] calamine::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Column(#[from] ColumnError),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Read the first worksheet of an xlsx/xlsm/xlsb/xls/ods workbook. The first
/// row holds the headers.
pub fn read_excel_bytes(bytes: &[u8]) -> Result<DataFrame, IoError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let range = workbook.worksheet_range_at(0).ok_or(IoError::NoWorksheet)??;

    let mut rows = range.rows();
    let header_row = rows.next().ok_or(IoError::MissingHeaders)?;
    let headers = header_names(header_row.iter().map(header_text).collect())?;

    let body: Vec<Vec<Scalar>> = rows
        .filter(|row| row.iter().any(|cell| !matches!(cell, Data::Empty)))
        .map(|row| row.iter().map(cell_to_scalar).collect())
        .collect();

    let frame = promote_columns(DataFrame::from_rows(headers, body)?)?;
    info!(rows = frame.len(), columns = frame.width(), "parsed workbook");
    Ok(frame)
}

pub fn read_excel_path(path: &Path) -> Result<DataFrame, IoError> {
    let bytes = std::fs::read(path)?;
    read_excel_bytes(&bytes)
}

/// Read a CSV document. Every cell starts as text and columns are promoted
/// the same way workbook columns are.
pub fn read_csv_str(input: &str) -> Result<DataFrame, IoError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input.as_bytes());

    let headers = reader.headers().cloned().map_err(IoError::from)?;
    if headers.is_empty() {
        return Err(IoError::MissingHeaders);
    }
    let headers = header_names(headers.iter().map(|name| name.trim().to_owned()).collect())?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(text_cell).collect());
    }

    let frame = promote_columns(DataFrame::from_rows(headers, rows)?)?;
    info!(rows = frame.len(), columns = frame.width(), "parsed csv");
    Ok(frame)
}

/// Dispatch on the file extension: `.csv` is read as text, anything else as
/// a workbook.
pub fn read_table(path: &Path) -> Result<DataFrame, IoError> {
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if is_csv {
        read_csv_str(&std::fs::read_to_string(path)?)
    } else {
        read_excel_path(path)
    }
}

/// Promote text columns: numeric when more than half of the non-null cells
/// normalize, else datetime when more than half parse as dates. Link columns
/// are always kept as text.
pub fn promote_columns(frame: DataFrame) -> Result<DataFrame, IoError> {
    let columns = frame
        .columns()
        .map(|(name, column)| Ok((name.to_owned(), promote_column(name, column)?)))
        .collect::<Result<Vec<_>, IoError>>()?;
    Ok(DataFrame::new(columns)?)
}

fn promote_column(name: &str, column: &Column) -> Result<Column, ColumnError> {
    if HeaderRole::Link.matches(name) {
        return Column::new(DType::Utf8, column.values().to_vec());
    }
    if column.dtype() != DType::Utf8 {
        return Ok(column.clone());
    }

    let coercion = column.coerce_numeric();
    if coercion.non_null_ratio() > PROMOTION_THRESHOLD {
        debug!(column = name, "promoted to float64");
        return column.to_float64();
    }

    let non_null = column.validity().count_valid();
    if non_null > 0 && column.datetime_convertible() as f64 / non_null as f64 > PROMOTION_THRESHOLD {
        debug!(column = name, "promoted to datetime");
        return column.to_datetime();
    }
    Ok(column.clone())
}

/// Blank headers get `Unnamed: {idx}`, repeated ones a `.{n}` suffix.
fn header_names(raw: Vec<String>) -> Result<Vec<String>, IoError> {
    if raw.iter().all(|name| name.is_empty()) {
        return Err(IoError::MissingHeaders);
    }

    let mut seen = HashSet::with_capacity(raw.len());
    let mut out = Vec::with_capacity(raw.len());
    for (idx, name) in raw.into_iter().enumerate() {
        let base = if name.is_empty() {
            format!("Unnamed: {idx}")
        } else {
            name
        };
        let mut candidate = base.clone();
        let mut suffix = 1;
        while !seen.insert(candidate.clone()) {
            candidate = format!("{base}.{suffix}");
            suffix += 1;
        }
        out.push(candidate);
    }
    Ok(out)
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(text) => text.trim().to_owned(),
        other => cell_to_scalar(other).to_text().unwrap_or_default(),
    }
}

fn text_cell(field: &str) -> Scalar {
    if field.trim().is_empty() {
        Scalar::Null(NullKind::Null)
    } else {
        Scalar::Utf8(field.to_owned())
    }
}

fn cell_to_scalar(cell: &Data) -> Scalar {
    match cell {
        Data::Int(value) => Scalar::Int64(*value),
        Data::Float(value) => Scalar::Float64(*value),
        Data::Bool(value) => Scalar::Bool(*value),
        Data::String(text) => text_cell(text),
        Data::DateTime(value) if value.is_duration() => Scalar::Float64(value.as_f64()),
        Data::DateTime(value) => excel_serial_to_datetime(value.as_f64())
            .map_or(Scalar::Null(NullKind::NaT), Scalar::Datetime),
        Data::DateTimeIso(text) => {
            parse_datetime_text(text).map_or_else(|| text_cell(text), Scalar::Datetime)
        }
        Data::DurationIso(text) => text_cell(text),
        _ => Scalar::Null(NullKind::Null),
    }
}

/// Serial day numbers count from 1899-12-30 (the 1900 leap-year bug already
/// folded in for dates after February 1900).
fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let seconds = (serial * 86_400.0).round() as i64;
    epoch.checked_add_signed(TimeDelta::try_seconds(seconds)?)
}
