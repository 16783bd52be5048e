#![forbid(unsafe_code)]

//! Public surface of linkfilter.
//!
//! ```no_run
//! use linkfilter::{AnalysisOptions, DiagnosticLedger, FilterRule, analyze, read_table};
//!
//! let frame = read_table("report.xlsx".as_ref())?;
//! let rule = FilterRule::from_json(
//!     r#"{"groups":[{"conditions":[{"field":"ctr","operator":">","value":5}]}]}"#,
//! )?;
//! let mut ledger = DiagnosticLedger::new();
//! let report = analyze(frame, &rule, &AnalysisOptions::default(), &mut ledger)?;
//! for record in &report.links {
//!     println!("{} {:?}", record.link, record.matched_rules);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub use lf_analysis::{
    AnalysisError, AnalysisOptions, AnalysisReport, ColumnClassifier, EntityRecord, EntitySnapshot,
    EntityStatus, FieldValue, LATEST_MATCH_PREFIX, LinkDetails, NameHeuristicClassifier,
    PreviewReport, StatusReport, analyze, analyze_with, classify_status, latest_snapshot,
    link_details, preview, recent_mean, root_domain, sort_records,
};
pub use lf_columnar::{Column, ComparisonOp};
pub use lf_frame::{DataFrame, FrameError};
pub use lf_io::{IoError, RuleStore, StoreError, StoredRule, read_csv_str, read_excel_bytes, read_table};
pub use lf_rules::{
    Condition, FilterRule, Group, Logic, MatchTrace, RuleError, RuleOutcome, evaluate,
};
pub use lf_runtime::{Diagnostic, DiagnosticLedger, IssueKind};
pub use lf_types::{
    DType, NullKind, Scalar, normalize_ctr, normalize_numeric, parse_numeric_text,
};
