#![forbid(unsafe_code)]

use std::collections::HashSet;

use lf_columnar::{Column, ColumnError};
use lf_types::{NullKind, Scalar};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("column {name:?} has length {column_len}, expected {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        column_len: usize,
    },
    #[error("duplicate column name {0:?}")]
    DuplicateColumn(String),
    #[error("unknown column {0:?}")]
    UnknownColumn(String),
    #[error(transparent)]
    Column(#[from] ColumnError),
}

/// A table of equally long, named columns in header order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    columns: Vec<(String, Column)>,
    row_count: usize,
}

impl DataFrame {
    pub fn new(columns: Vec<(String, Column)>) -> Result<Self, FrameError> {
        let row_count = columns.first().map_or(0, |(_, column)| column.len());
        let mut seen = HashSet::with_capacity(columns.len());
        for (name, column) in &columns {
            if !seen.insert(name.as_str()) {
                return Err(FrameError::DuplicateColumn(name.clone()));
            }
            if column.len() != row_count {
                return Err(FrameError::LengthMismatch {
                    name: name.clone(),
                    expected: row_count,
                    column_len: column.len(),
                });
            }
        }

        Ok(Self { columns, row_count })
    }

    #[must_use]
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            row_count: 0,
        }
    }

    /// Build a frame from row-major cells. Short rows are padded with nulls,
    /// extra cells beyond the header are ignored.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<Scalar>>) -> Result<Self, FrameError> {
        let mut cells: Vec<Vec<Scalar>> = headers
            .iter()
            .map(|_| Vec::with_capacity(rows.len()))
            .collect();

        for row in rows {
            let mut row = row.into_iter();
            for slot in &mut cells {
                slot.push(row.next().unwrap_or(Scalar::Null(NullKind::Null)));
            }
        }

        let columns = headers
            .into_iter()
            .zip(cells)
            .map(|(name, values)| Ok((name, Column::from_values(values)?)))
            .collect::<Result<Vec<_>, FrameError>>()?;
        Self::new(columns)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.row_count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns
            .iter()
            .map(|(name, column)| (name.as_str(), column))
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, column)| column)
    }

    pub fn require_column(&self, name: &str) -> Result<&Column, FrameError> {
        self.column(name)
            .ok_or_else(|| FrameError::UnknownColumn(name.to_owned()))
    }

    /// Replace a column in place, or append it when the name is new.
    pub fn with_column(mut self, name: &str, column: Column) -> Result<Self, FrameError> {
        if !self.columns.is_empty() && column.len() != self.row_count {
            return Err(FrameError::LengthMismatch {
                name: name.to_owned(),
                expected: self.row_count,
                column_len: column.len(),
            });
        }
        if self.columns.is_empty() {
            self.row_count = column.len();
        }

        match self.columns.iter_mut().find(|(candidate, _)| candidate == name) {
            Some(slot) => slot.1 = column,
            None => self.columns.push((name.to_owned(), column)),
        }
        Ok(self)
    }

    pub fn take_rows(&self, positions: &[usize]) -> Result<Self, FrameError> {
        let columns = self
            .columns
            .iter()
            .map(|(name, column)| Ok((name.clone(), column.take(positions)?)))
            .collect::<Result<Vec<_>, FrameError>>()?;
        Ok(Self {
            columns,
            row_count: positions.len(),
        })
    }

    pub fn filter_rows(&self, mask: &[bool]) -> Result<Self, FrameError> {
        if mask.len() != self.row_count {
            return Err(FrameError::Column(ColumnError::LengthMismatch {
                left: self.row_count,
                right: mask.len(),
            }));
        }
        let positions = mask
            .iter()
            .enumerate()
            .filter_map(|(idx, keep)| keep.then_some(idx))
            .collect::<Vec<_>>();
        self.take_rows(&positions)
    }

    pub fn head(&self, n: usize) -> Result<Self, FrameError> {
        let positions = (0..n.min(self.row_count)).collect::<Vec<_>>();
        self.take_rows(&positions)
    }

    /// Cells of one row as `(column, value)` pairs in header order.
    #[must_use]
    pub fn row(&self, idx: usize) -> Option<Vec<(&str, &Scalar)>> {
        if idx >= self.row_count {
            return None;
        }
        self.columns
            .iter()
            .map(|(name, column)| column.value(idx).map(|value| (name.as_str(), value)))
            .collect()
    }
}
