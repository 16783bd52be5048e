#![forbid(unsafe_code)]

//! Per-entity analysis of a spreadsheet frame: column roles, recency
//! status, N-day and latest-day aggregation, rule evaluation and the
//! ranked entity records built from it.

pub mod aggregate;
pub mod assemble;
pub mod classify;
pub mod config;
mod pipeline;
pub mod preview;
pub mod status;

use lf_columnar::ColumnError;
use lf_frame::FrameError;
use lf_groupby::GroupByError;
use lf_rules::RuleError;
use thiserror::Error;

pub use aggregate::{NUMERIC_THRESHOLD, latest_snapshot, recent_mean};
pub use assemble::{
    EntityRecord, EntitySnapshot, FieldValue, LATEST_MATCH_PREFIX, build_records, merge_latest,
    revenue_by_link, root_domain, sort_records,
};
pub use classify::{ColumnClassifier, NameHeuristicClassifier, find_link_column, resolve_date_column};
pub use config::{AnalysisOptions, DEFAULT_DAYS, DEFAULT_PREVIEW_ROWS, MAX_DAYS};
pub use pipeline::{AnalysisReport, analyze, analyze_with};
pub use preview::{JsonRow, LinkDetails, PreviewReport, link_details, preview, scalar_to_json};
pub use status::{EntityStatus, StatusReport, classify_status, status_for};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("cannot identify the link column: the dataset has no columns")]
    NoLinkColumn,
    #[error("days must be between 1 and {max}, got {0}", max = MAX_DAYS)]
    InvalidDays(u32),
    #[error("no rows found for link {0:?}")]
    UnknownLink(String),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Column(#[from] ColumnError),
    #[error(transparent)]
    GroupBy(#[from] GroupByError),
    #[error(transparent)]
    Rule(#[from] RuleError),
}
