#![forbid(unsafe_code)]

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod headers;
pub mod numeric;

pub use headers::{HeaderRole, fold_case, header_matches};
pub use numeric::{
    clean_numeric_text, normalize_ctr, normalize_numeric, parse_numeric_text, promote_ctr,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Null,
    Bool,
    Int64,
    Float64,
    Utf8,
    Datetime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullKind {
    Null,
    NaN,
    NaT,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    Null(NullKind),
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Datetime(NaiveDateTime),
}

impl Scalar {
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::Null(_) => DType::Null,
            Self::Bool(_) => DType::Bool,
            Self::Int64(_) => DType::Int64,
            Self::Float64(_) => DType::Float64,
            Self::Utf8(_) => DType::Utf8,
            Self::Datetime(_) => DType::Datetime,
        }
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null(_) => true,
            Self::Float64(v) => v.is_nan(),
            _ => false,
        }
    }

    #[must_use]
    pub fn missing_for_dtype(dtype: DType) -> Self {
        match dtype {
            DType::Float64 => Self::Null(NullKind::NaN),
            DType::Datetime => Self::Null(NullKind::NaT),
            DType::Null | DType::Bool | DType::Int64 | DType::Utf8 => Self::Null(NullKind::Null),
        }
    }

    pub fn to_f64(&self) -> Result<f64, TypeError> {
        match self {
            Self::Bool(v) => Ok(if *v { 1.0 } else { 0.0 }),
            Self::Int64(v) => Ok(*v as f64),
            Self::Float64(v) => Ok(*v),
            Self::Null(kind) => Err(TypeError::ValueIsMissing { kind: *kind }),
            Self::Utf8(v) => Err(TypeError::NonNumericValue {
                value: v.clone(),
                dtype: DType::Utf8,
            }),
            Self::Datetime(v) => Err(TypeError::NonNumericValue {
                value: v.to_string(),
                dtype: DType::Datetime,
            }),
        }
    }

    /// Timestamp view of the value; Utf8 cells are parsed with [`parse_datetime_text`].
    #[must_use]
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Datetime(v) => Some(*v),
            Self::Utf8(v) => parse_datetime_text(v),
            _ => None,
        }
    }

    /// Text form used for entity keys and display. Missing values have no text.
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        if self.is_missing() {
            return None;
        }
        Some(self.to_string())
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null(_) => Ok(()),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => {
                if v.is_nan() {
                    Ok(())
                } else {
                    write!(f, "{v}")
                }
            }
            Self::Utf8(v) => f.write_str(v),
            Self::Datetime(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float64(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<NaiveDateTime> for Scalar {
    fn from(value: NaiveDateTime) -> Self {
        Self::Datetime(value)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypeError {
    #[error("dtype coercion from {left:?} to {right:?} has no compatible common type")]
    IncompatibleDtypes { left: DType, right: DType },
    #[error("cannot cast scalar of dtype {from:?} to {to:?}")]
    InvalidCast { from: DType, to: DType },
    #[error("cannot cast float {value} to int64 without loss")]
    LossyFloatToInt { value: f64 },
    #[error("value {value:?} has non-numeric dtype {dtype:?}")]
    NonNumericValue { value: String, dtype: DType },
    #[error("value is missing ({kind:?})")]
    ValueIsMissing { kind: NullKind },
}

pub fn common_dtype(left: DType, right: DType) -> Result<DType, TypeError> {
    use DType::{Bool, Datetime, Float64, Int64, Null, Utf8};

    let out = match (left, right) {
        (a, b) if a == b => a,
        (Null, other) | (other, Null) => other,
        (Bool, Int64) | (Int64, Bool) => Int64,
        (Bool, Float64) | (Float64, Bool) => Float64,
        (Int64, Float64) | (Float64, Int64) => Float64,
        (Utf8, Utf8) => Utf8,
        (Datetime, Datetime) => Datetime,
        _ => return Err(TypeError::IncompatibleDtypes { left, right }),
    };

    Ok(out)
}

pub fn infer_dtype(values: &[Scalar]) -> Result<DType, TypeError> {
    let mut current = DType::Null;
    for value in values {
        current = common_dtype(current, value.dtype())?;
    }
    Ok(current)
}

/// Like [`infer_dtype`], but a column mixing incompatible kinds (text next to
/// numbers, as spreadsheets routinely do) degrades to `Utf8` instead of failing.
#[must_use]
pub fn infer_dtype_lenient(values: &[Scalar]) -> DType {
    infer_dtype(values).unwrap_or(DType::Utf8)
}

pub fn cast_scalar(value: Scalar, target: DType) -> Result<Scalar, TypeError> {
    let from = value.dtype();
    if matches!(value, Scalar::Null(_)) {
        return Ok(Scalar::missing_for_dtype(target));
    }
    if from == target {
        return Ok(value);
    }

    match target {
        DType::Null => Ok(Scalar::Null(NullKind::Null)),
        DType::Int64 => match value {
            Scalar::Bool(v) => Ok(Scalar::Int64(i64::from(v))),
            Scalar::Float64(v) => {
                if !v.is_finite() || v != v.trunc() || v < i64::MIN as f64 || v > i64::MAX as f64 {
                    return Err(TypeError::LossyFloatToInt { value: v });
                }
                Ok(Scalar::Int64(v as i64))
            }
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        DType::Float64 => match value {
            Scalar::Bool(v) => Ok(Scalar::Float64(if v { 1.0 } else { 0.0 })),
            Scalar::Int64(v) => Ok(Scalar::Float64(v as f64)),
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        // Anything renders to text; mixed spreadsheet columns rely on this.
        DType::Utf8 => Ok(Scalar::Utf8(value.to_string())),
        DType::Datetime => match value.to_datetime() {
            Some(ts) => Ok(Scalar::Datetime(ts)),
            None => Err(TypeError::InvalidCast { from, to: target }),
        },
        DType::Bool => Err(TypeError::InvalidCast { from, to: target }),
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y年%m月%d日"];

/// Parse the timestamp spellings that show up in exported reports.
#[must_use]
pub fn parse_datetime_text(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    for format in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(ts);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}
