use chrono::NaiveDate;
use lf_frame::DataFrame;
use lf_rules::{FilterRule, evaluate};
use lf_runtime::{DiagnosticLedger, IssueKind};
use serde::Serialize;
use tracing::{debug, info};

use crate::AnalysisError;
use crate::aggregate::{latest_snapshot, recent_mean};
use crate::assemble::{EntityRecord, build_records, merge_latest, revenue_by_link, sort_records};
use crate::classify::{ColumnClassifier, NameHeuristicClassifier, find_link_column, resolve_date_column};
use crate::config::AnalysisOptions;
use crate::status::classify_status;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub total_rows: usize,
    pub matched_count: usize,
    pub links: Vec<EntityRecord>,
    pub columns: Vec<String>,
    pub link_column: String,
    pub date_column: Option<String>,
    pub latest_date: Option<NaiveDate>,
    pub rule_fields: Vec<String>,
    pub missing_yesterday: Vec<String>,
    pub offline: Vec<String>,
}

/// Run `rule` over `frame` with the header-name classifier.
pub fn analyze(
    frame: DataFrame,
    rule: &FilterRule,
    options: &AnalysisOptions,
    ledger: &mut DiagnosticLedger,
) -> Result<AnalysisReport, AnalysisError> {
    analyze_with(frame, rule, options, &NameHeuristicClassifier, ledger)
}

/// Full pass: classify columns, bucket entities by recency, then evaluate
/// the rule against the N-day mean and the latest-day snapshot of the
/// normal entities and merge both record sets.
pub fn analyze_with(
    frame: DataFrame,
    rule: &FilterRule,
    options: &AnalysisOptions,
    classifier: &dyn ColumnClassifier,
    ledger: &mut DiagnosticLedger,
) -> Result<AnalysisReport, AnalysisError> {
    options.validate()?;
    let total_rows = frame.len();
    let columns: Vec<String> = frame.column_names().into_iter().map(str::to_owned).collect();

    let link_column = find_link_column(&frame, classifier)?;
    let (frame, date_column) = resolve_date_column(frame, classifier)?;
    if date_column.is_none() {
        ledger.record(
            IssueKind::MissingDateColumn,
            link_column.as_str(),
            "no date column found, using every row",
        );
    }
    let date = date_column.as_deref();
    debug!(link_column = %link_column, date_column = ?date, total_rows, "resolved columns");

    let status = classify_status(&frame, &link_column, date, ledger)?;
    let mean = recent_mean(&status.normal, &link_column, date, options.days)?;
    let latest = latest_snapshot(&status.normal, &link_column, date)?;

    let mean_outcome = evaluate(&mean, rule, ledger)?;
    let latest_outcome = evaluate(&latest, rule, ledger)?;
    let latest_revenue = revenue_by_link(&latest, &link_column);

    let mut links = merge_latest(
        build_records(&mean_outcome, rule, &link_column),
        build_records(&latest_outcome, rule, &link_column),
        &latest_revenue,
    );
    sort_records(&mut links);

    info!(
        total_rows,
        matched = links.len(),
        missing_yesterday = status.missing_yesterday.len(),
        offline = status.offline.len(),
        diagnostics = ledger.len(),
        "analysis complete"
    );
    Ok(AnalysisReport {
        total_rows,
        matched_count: links.len(),
        links,
        columns,
        link_column,
        date_column,
        latest_date: status.latest_date,
        rule_fields: rule.fields(),
        missing_yesterday: status.missing_yesterday,
        offline: status.offline,
    })
}
