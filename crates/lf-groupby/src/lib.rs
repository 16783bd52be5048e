#![forbid(unsafe_code)]

use std::collections::HashMap;

use chrono::NaiveDateTime;
use lf_columnar::{Column, ColumnError};
use lf_types::{DType, NullKind, Scalar};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GroupByError {
    #[error("grouping covers {expected} rows but the value column has {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error(transparent)]
    Column(#[from] ColumnError),
}

/// Row positions per group, groups in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grouping {
    keys: Vec<String>,
    members: Vec<Vec<usize>>,
    row_count: usize,
    dropped: usize,
}

impl Grouping {
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    #[must_use]
    pub fn members(&self) -> &[Vec<usize>] {
        &self.members
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Rows skipped because their key was missing.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    fn check_len(&self, column: &Column) -> Result<(), GroupByError> {
        if column.len() != self.row_count {
            return Err(GroupByError::LengthMismatch {
                expected: self.row_count,
                actual: column.len(),
            });
        }
        Ok(())
    }
}

/// Group rows by the text form of their key. Rows with a missing key are
/// counted in [`Grouping::dropped`] and left out.
///
/// `Int64(5)` and `Utf8("5")` land in the same group; entity identity is
/// the rendered link value.
#[must_use]
pub fn group_rows(keys: &Column) -> Grouping {
    let mut ordering = Vec::<String>::new();
    let mut slot = HashMap::<String, usize>::new();
    let mut members = Vec::<Vec<usize>>::new();
    let mut dropped = 0;

    for (row, key) in keys.values().iter().enumerate() {
        let Some(label) = key.to_text() else {
            dropped += 1;
            continue;
        };

        let group = *slot.entry(label.clone()).or_insert_with(|| {
            ordering.push(label);
            members.push(Vec::new());
            members.len() - 1
        });
        members[group].push(row);
    }

    Grouping {
        keys: ordering,
        members,
        row_count: keys.len(),
        dropped,
    }
}

/// Arithmetic mean per group over the cells that normalize to numbers.
/// Groups without a single numeric cell get NaN.
pub fn groupby_mean(grouping: &Grouping, values: &Column) -> Result<Column, GroupByError> {
    grouping.check_len(values)?;
    let numbers = values.coerce_numeric().values;

    let out = grouping
        .members
        .iter()
        .map(|rows| {
            let (sum, count) = rows
                .iter()
                .filter_map(|&row| numbers[row])
                .fold((0.0_f64, 0_usize), |(sum, count), v| (sum + v, count + 1));
            if count == 0 {
                Scalar::Null(NullKind::NaN)
            } else {
                Scalar::Float64(sum / count as f64)
            }
        })
        .collect();

    Ok(Column::new(DType::Float64, out)?)
}

/// Row with the greatest timestamp per group, first one on ties.
/// `None` for groups whose rows all lack a timestamp.
pub fn groupby_latest(
    grouping: &Grouping,
    timestamps: &Column,
) -> Result<Vec<Option<usize>>, GroupByError> {
    grouping.check_len(timestamps)?;
    let stamps: Vec<Option<NaiveDateTime>> = timestamps
        .values()
        .iter()
        .map(Scalar::to_datetime)
        .collect();

    Ok(grouping
        .members
        .iter()
        .map(|rows| {
            let mut best: Option<(usize, NaiveDateTime)> = None;
            for &row in rows {
                let Some(ts) = stamps[row] else { continue };
                match best {
                    Some((_, current)) if ts <= current => {}
                    _ => best = Some((row, ts)),
                }
            }
            best.map(|(row, _)| row)
        })
        .collect())
}
