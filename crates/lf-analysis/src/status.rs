//! Recency buckets per entity: normal, missing yesterday, offline.

use std::collections::HashSet;

use chrono::NaiveDate;
use lf_frame::DataFrame;
use lf_groupby::group_rows;
use lf_runtime::{DiagnosticLedger, IssueKind};
use serde::Serialize;
use tracing::debug;

use crate::AnalysisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Normal,
    MissingYesterday,
    Offline,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub latest_date: Option<NaiveDate>,
    pub missing_yesterday: Vec<String>,
    pub offline: Vec<String>,
    /// Rows of normal entities, in input order.
    pub normal: DataFrame,
}

/// `latest` is the newest calendar day in the data, `yesterday` the day before.
#[must_use]
pub fn status_for(
    dates: &HashSet<NaiveDate>,
    latest: NaiveDate,
    yesterday: Option<NaiveDate>,
) -> EntityStatus {
    let has_latest = dates.contains(&latest);
    let has_yesterday = yesterday.is_some_and(|day| dates.contains(&day));
    match (has_latest, has_yesterday) {
        (false, false) => EntityStatus::Offline,
        (true, false) => EntityStatus::MissingYesterday,
        _ => EntityStatus::Normal,
    }
}

/// Split entities by whether they reported on the last two calendar days.
///
/// Without a date column, or when no date parses, every entity is normal.
/// Rows without a link value are dropped from every output.
pub fn classify_status(
    frame: &DataFrame,
    link_column: &str,
    date_column: Option<&str>,
    ledger: &mut DiagnosticLedger,
) -> Result<StatusReport, AnalysisError> {
    let grouping = group_rows(frame.require_column(link_column)?);
    if grouping.dropped() > 0 {
        ledger.record(
            IssueKind::MissingLink,
            link_column,
            format!("{} row(s) without a link value were dropped", grouping.dropped()),
        );
    }

    let days: Option<Vec<Option<NaiveDate>>> = match date_column {
        Some(name) => Some(
            frame
                .require_column(name)?
                .values()
                .iter()
                .map(|value| value.to_datetime().map(|ts| ts.date()))
                .collect(),
        ),
        None => None,
    };
    let latest = days
        .as_ref()
        .and_then(|days| days.iter().flatten().max().copied());

    let (Some(days), Some(latest)) = (days, latest) else {
        if let Some(name) = date_column {
            ledger.record(
                IssueKind::UnparseableDates,
                name,
                "no cell parses as a date, status classification skipped",
            );
        }
        let mut keep: Vec<usize> = grouping.members().iter().flatten().copied().collect();
        keep.sort_unstable();
        return Ok(StatusReport {
            latest_date: None,
            missing_yesterday: Vec::new(),
            offline: Vec::new(),
            normal: frame.take_rows(&keep)?,
        });
    };
    let yesterday = latest.pred_opt();

    let mut missing_yesterday = Vec::new();
    let mut offline = Vec::new();
    let mut keep = Vec::new();
    for (key, rows) in grouping.keys().iter().zip(grouping.members()) {
        let seen: HashSet<NaiveDate> = rows.iter().filter_map(|&row| days[row]).collect();
        match status_for(&seen, latest, yesterday) {
            EntityStatus::Normal => keep.extend_from_slice(rows),
            EntityStatus::MissingYesterday => missing_yesterday.push(key.clone()),
            EntityStatus::Offline => offline.push(key.clone()),
        }
    }
    keep.sort_unstable();

    debug!(
        %latest,
        normal_rows = keep.len(),
        missing_yesterday = missing_yesterday.len(),
        offline = offline.len(),
        "classified entity status"
    );
    Ok(StatusReport {
        latest_date: Some(latest),
        missing_yesterday,
        offline,
        normal: frame.take_rows(&keep)?,
    })
}
