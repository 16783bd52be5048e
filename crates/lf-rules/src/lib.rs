#![forbid(unsafe_code)]

//! Filter rules: groups of numeric conditions combined with AND/OR, and the
//! row-level evaluation that keeps a trace of what each surviving row matched.

mod describe;

use std::collections::BTreeSet;
use std::fmt;

use lf_columnar::ComparisonOp;
use lf_frame::{DataFrame, FrameError};
use lf_runtime::{DiagnosticLedger, IssueKind};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use describe::{DESCRIPTION_SEPARATOR, assemble_descriptions, describe_condition, describe_row};

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid rule at `{path}`: {message}")]
    Invalid { path: String, message: String },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Logic {
    And,
    #[default]
    Or,
}

impl Logic {
    fn identity(self) -> bool {
        matches!(self, Self::And)
    }

    fn join(self, left: bool, right: bool) -> bool {
        match self {
            Self::And => left && right,
            Self::Or => left || right,
        }
    }

    /// Fold equally long masks into one.
    #[must_use]
    pub fn combine<'a>(self, len: usize, masks: impl IntoIterator<Item = &'a [bool]>) -> Vec<bool> {
        let mut out = vec![self.identity(); len];
        for mask in masks {
            for (slot, bit) in out.iter_mut().zip(mask) {
                *slot = self.join(*slot, *bit);
            }
        }
        out
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::And => "and",
            Self::Or => "or",
        })
    }
}

impl<'de> Deserialize<'de> for Logic {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.trim().to_ascii_lowercase().as_str() {
            "and" => Ok(Self::And),
            "or" => Ok(Self::Or),
            _ => Err(de::Error::unknown_variant(&raw, &["and", "or"])),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    /// Kept as written; resolved when the rule runs.
    pub operator: String,
    pub value: f64,
    #[serde(default)]
    pub priority: i64,
}

impl Condition {
    #[must_use]
    pub fn new(field: impl Into<String>, operator: impl Into<String>, value: f64) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value,
            priority: 0,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn comparison(&self) -> Option<ComparisonOp> {
        ComparisonOp::parse(&self.operator)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub logic: Logic,
    #[serde(default)]
    pub priority: i64,
}

impl Group {
    #[must_use]
    pub fn new(logic: Logic, conditions: Vec<Condition>) -> Self {
        Self {
            conditions,
            logic,
            priority: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    pub groups: Vec<Group>,
    #[serde(default)]
    pub logic: Logic,
}

impl FilterRule {
    #[must_use]
    pub fn new(logic: Logic, groups: Vec<Group>) -> Self {
        Self { groups, logic }
    }

    /// Parse a rule, pointing at the offending JSON path on schema errors.
    pub fn from_json(raw: &str) -> Result<Self, RuleError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let rule = serde_path_to_error::deserialize(&mut deserializer).map_err(invalid)?;
        deserializer.end()?;
        Ok(rule)
    }

    /// Every field referenced by a condition, sorted and deduplicated.
    #[must_use]
    pub fn fields(&self) -> Vec<String> {
        self.groups
            .iter()
            .flat_map(|group| group.conditions.iter())
            .map(|condition| condition.field.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

fn invalid(err: serde_path_to_error::Error<serde_json::Error>) -> RuleError {
    RuleError::Invalid {
        path: err.path().to_string(),
        message: err.inner().to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMatch {
    /// Declaration index in `FilterRule::groups`.
    pub group_index: usize,
    /// Indices of the satisfied conditions within that group.
    pub conditions: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowTrace {
    /// Row position in the evaluated frame.
    pub source_row: usize,
    /// Groups whose mask held for this row.
    pub groups: Vec<GroupMatch>,
}

impl RowTrace {
    #[must_use]
    pub fn group_indices(&self) -> Vec<usize> {
        self.groups.iter().map(|group| group.group_index).collect()
    }
}

/// One entry per retained row, in output order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchTrace {
    rows: Vec<RowTrace>,
}

impl MatchTrace {
    #[must_use]
    pub fn get(&self, output_row: usize) -> Option<&RowTrace> {
        self.rows.get(output_row)
    }

    #[must_use]
    pub fn rows(&self) -> &[RowTrace] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    pub rows: DataFrame,
    pub trace: MatchTrace,
}

struct GroupEval {
    group_index: usize,
    mask: Vec<bool>,
    condition_masks: Vec<Vec<bool>>,
}

/// Apply `rule` to `frame`.
///
/// Groups without conditions are skipped. When no group is left the frame
/// comes back unfiltered with an empty trace. A condition that cannot be
/// evaluated for a cell counts as `false` there and is recorded in `ledger`.
pub fn evaluate(
    frame: &DataFrame,
    rule: &FilterRule,
    ledger: &mut DiagnosticLedger,
) -> Result<RuleOutcome, RuleError> {
    let len = frame.len();
    let evaluated: Vec<GroupEval> = rule
        .groups
        .iter()
        .enumerate()
        .filter(|(_, group)| !group.conditions.is_empty())
        .map(|(group_index, group)| {
            let condition_masks: Vec<Vec<bool>> = group
                .conditions
                .iter()
                .map(|condition| condition_mask(frame, condition, ledger))
                .collect();
            let mask = group
                .logic
                .combine(len, condition_masks.iter().map(Vec::as_slice));
            GroupEval {
                group_index,
                mask,
                condition_masks,
            }
        })
        .collect();

    if evaluated.is_empty() {
        debug!(rows = len, "rule has no conditions, keeping every row");
        return Ok(RuleOutcome {
            rows: frame.clone(),
            trace: MatchTrace::default(),
        });
    }

    let keep = rule
        .logic
        .combine(len, evaluated.iter().map(|group| group.mask.as_slice()));

    let mut positions = Vec::new();
    let mut trace = Vec::new();
    for (row, _) in keep.iter().enumerate().filter(|(_, kept)| **kept) {
        positions.push(row);
        trace.push(RowTrace {
            source_row: row,
            groups: evaluated
                .iter()
                .filter(|group| group.mask[row])
                .map(|group| GroupMatch {
                    group_index: group.group_index,
                    conditions: group
                        .condition_masks
                        .iter()
                        .enumerate()
                        .filter(|(_, mask)| mask[row])
                        .map(|(idx, _)| idx)
                        .collect(),
                })
                .collect(),
        });
    }

    debug!(rows = len, matched = positions.len(), "rule evaluated");
    Ok(RuleOutcome {
        rows: frame.take_rows(&positions)?,
        trace: MatchTrace { rows: trace },
    })
}

fn condition_mask(
    frame: &DataFrame,
    condition: &Condition,
    ledger: &mut DiagnosticLedger,
) -> Vec<bool> {
    let Some(column) = frame.column(&condition.field) else {
        ledger.record(
            IssueKind::UnknownField,
            condition.field.as_str(),
            "field is not a column of the dataset, condition matches no rows",
        );
        return vec![false; frame.len()];
    };
    let Some(op) = condition.comparison() else {
        ledger.record(
            IssueKind::UnknownOperator,
            condition.operator.as_str(),
            format!("unsupported operator on field {:?}, condition matches no rows", condition.field),
        );
        return vec![false; frame.len()];
    };

    let mask = column.compare_f64(op, condition.value);
    if !mask.coercion_failures.is_empty() {
        ledger.record(
            IssueKind::CoercionFailure,
            condition.field.as_str(),
            format!(
                "{} cell(s) are not numeric and were treated as non-matching",
                mask.coercion_failures.len()
            ),
        );
    }
    mask.bits
}
