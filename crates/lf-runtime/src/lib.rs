#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// A rule referenced a column the frame does not have.
    UnknownField,
    /// A rule used an operator outside the supported set.
    UnknownOperator,
    /// A non-null cell could not be read as a number.
    CoercionFailure,
    /// No date column was found; recency logic fell back to all rows.
    MissingDateColumn,
    /// A date column exists but none of its cells parse.
    UnparseableDates,
    /// Rows without a link value were dropped.
    MissingLink,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: IssueKind,
    pub subject: String,
    pub detail: String,
}

/// Caller-owned record of everything an analysis degraded on instead of failing.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticLedger {
    records: Vec<Diagnostic>,
}

impl DiagnosticLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: Diagnostic) {
        self.records.push(record);
    }

    /// Log the anomaly and keep it for the caller.
    pub fn record(&mut self, kind: IssueKind, subject: impl Into<String>, detail: impl Into<String>) {
        let record = Diagnostic {
            kind,
            subject: subject.into(),
            detail: detail.into(),
        };
        warn!(kind = ?record.kind, subject = %record.subject, "{}", record.detail);
        self.push(record);
    }

    #[must_use]
    pub fn records(&self) -> &[Diagnostic] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn count(&self, kind: IssueKind) -> usize {
        self.records
            .iter()
            .filter(|record| record.kind == kind)
            .count()
    }
}
