#![forbid(unsafe_code)]

use std::fmt;

use lf_types::{
    DType, NullKind, Scalar, TypeError, cast_scalar, infer_dtype_lenient, normalize_numeric,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityMask {
    bits: Vec<bool>,
}

impl ValidityMask {
    #[must_use]
    pub fn from_values(values: &[Scalar]) -> Self {
        let bits = values.iter().map(|value| !value.is_missing()).collect();
        Self { bits }
    }

    #[must_use]
    pub fn count_valid(&self) -> usize {
        self.bits.iter().filter(|bit| **bit).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    dtype: DType,
    values: Vec<Scalar>,
    validity: ValidityMask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl ComparisonOp {
    /// Resolve an operator as written in a rule. `=` and `<>` are accepted
    /// spellings of `==` and `!=`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            "==" | "=" => Some(Self::Eq),
            "!=" | "<>" => Some(Self::Ne),
            _ => None,
        }
    }

    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Ge => "≥",
            Self::Lt => "<",
            Self::Le => "≤",
            Self::Eq => "=",
            Self::Ne => "≠",
        }
    }

    #[must_use]
    pub fn apply(self, left: f64, right: f64) -> bool {
        match self {
            Self::Gt => left > right,
            Self::Ge => left >= right,
            Self::Lt => left < right,
            Self::Le => left <= right,
            Self::Eq => left == right,
            Self::Ne => left != right,
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Result of pushing every cell of a column through the numeric normalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericCoercion {
    pub values: Vec<Option<f64>>,
    pub non_null: usize,
    pub converted: usize,
    /// Positions of non-null cells that failed to normalize.
    pub failures: Vec<usize>,
}

impl NumericCoercion {
    /// Share of non-null cells that converted.
    #[must_use]
    pub fn non_null_ratio(&self) -> f64 {
        if self.non_null == 0 {
            return 0.0;
        }
        self.converted as f64 / self.non_null as f64
    }

    /// Share of all rows that converted; null cells count against it.
    #[must_use]
    pub fn row_ratio(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.converted as f64 / self.values.len() as f64
    }
}

/// Per-row outcome of comparing a column against a literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonMask {
    pub bits: Vec<bool>,
    /// Rows whose non-null cell could not be read as a number.
    pub coercion_failures: Vec<usize>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ColumnError {
    #[error("column length mismatch: left={left}, right={right}")]
    LengthMismatch { left: usize, right: usize },
    #[error("row position {position} out of bounds for column of length {len}")]
    OutOfBounds { position: usize, len: usize },
    #[error(transparent)]
    Type(#[from] TypeError),
}

impl Column {
    /// Construct a column, coercing values to the target dtype.
    pub fn new(dtype: DType, values: Vec<Scalar>) -> Result<Self, ColumnError> {
        let coerced = values
            .into_iter()
            .map(|value| cast_scalar(value, dtype))
            .collect::<Result<Vec<_>, _>>()?;
        let validity = ValidityMask::from_values(&coerced);

        Ok(Self {
            dtype,
            values: coerced,
            validity,
        })
    }

    /// Infer the dtype from the values; mixed text/number columns become Utf8.
    pub fn from_values(values: Vec<Scalar>) -> Result<Self, ColumnError> {
        let dtype = infer_dtype_lenient(&values);
        Self::new(dtype, values)
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    #[must_use]
    pub fn value(&self, idx: usize) -> Option<&Scalar> {
        self.values.get(idx)
    }

    #[must_use]
    pub fn validity(&self) -> &ValidityMask {
        &self.validity
    }

    /// Gather rows by position, preserving the given order.
    pub fn take(&self, positions: &[usize]) -> Result<Self, ColumnError> {
        let values = positions
            .iter()
            .map(|&position| {
                self.values
                    .get(position)
                    .cloned()
                    .ok_or(ColumnError::OutOfBounds {
                        position,
                        len: self.values.len(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            dtype: self.dtype,
            validity: ValidityMask::from_values(&values),
            values,
        })
    }

    #[must_use]
    pub fn coerce_numeric(&self) -> NumericCoercion {
        let mut values = Vec::with_capacity(self.values.len());
        let mut non_null = 0;
        let mut converted = 0;
        let mut failures = Vec::new();

        for (idx, value) in self.values.iter().enumerate() {
            if value.is_missing() {
                values.push(None);
                continue;
            }
            non_null += 1;
            match normalize_numeric(value) {
                Ok(number) => {
                    converted += 1;
                    values.push(Some(number));
                }
                Err(_) => {
                    failures.push(idx);
                    values.push(None);
                }
            }
        }

        NumericCoercion {
            values,
            non_null,
            converted,
            failures,
        }
    }

    /// Float64 copy of the column; cells that do not normalize become NaN.
    pub fn to_float64(&self) -> Result<Self, ColumnError> {
        if self.dtype == DType::Float64 {
            return Ok(self.clone());
        }
        let values = self
            .coerce_numeric()
            .values
            .into_iter()
            .map(|value| value.map_or(Scalar::Null(NullKind::NaN), Scalar::Float64))
            .collect();
        Self::new(DType::Float64, values)
    }

    /// Number of non-null cells that read as timestamps.
    #[must_use]
    pub fn datetime_convertible(&self) -> usize {
        self.values
            .iter()
            .filter(|value| !value.is_missing() && value.to_datetime().is_some())
            .count()
    }

    /// Datetime copy of the column; cells that do not parse become NaT.
    pub fn to_datetime(&self) -> Result<Self, ColumnError> {
        if self.dtype == DType::Datetime {
            return Ok(self.clone());
        }
        let values = self
            .values
            .iter()
            .map(|value| {
                value
                    .to_datetime()
                    .map_or(Scalar::Null(NullKind::NaT), Scalar::Datetime)
            })
            .collect();
        Self::new(DType::Datetime, values)
    }

    /// Compare every cell against `rhs` after numeric normalization.
    ///
    /// Missing cells compare false silently; non-null cells that do not
    /// normalize compare false and are reported in `coercion_failures`.
    #[must_use]
    pub fn compare_f64(&self, op: ComparisonOp, rhs: f64) -> ComparisonMask {
        let coercion = self.coerce_numeric();
        let bits = coercion
            .values
            .iter()
            .map(|value| value.is_some_and(|lhs| op.apply(lhs, rhs)))
            .collect();

        ComparisonMask {
            bits,
            coercion_failures: coercion.failures,
        }
    }
}
