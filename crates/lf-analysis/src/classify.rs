//! Column role inference from header names and column types.

use lf_frame::DataFrame;
use lf_types::{DType, HeaderRole};
use tracing::debug;

use crate::AnalysisError;

/// Strategy for picking the entity-key and date columns of a dataset.
pub trait ColumnClassifier {
    fn link_column(&self, frame: &DataFrame) -> Option<String>;
    fn date_column(&self, frame: &DataFrame) -> Option<String>;
}

/// Substring match on case-folded headers.
///
/// The link column is the first header mentioning `链接`, `url` or `link`,
/// falling back to the first column. The date column is the first column
/// already typed as datetime, else the first header mentioning `日期` or
/// `date`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NameHeuristicClassifier;

impl ColumnClassifier for NameHeuristicClassifier {
    fn link_column(&self, frame: &DataFrame) -> Option<String> {
        let names = frame.column_names();
        names
            .iter()
            .find(|name| HeaderRole::Link.matches(name))
            .or_else(|| names.first())
            .map(|name| (*name).to_owned())
    }

    fn date_column(&self, frame: &DataFrame) -> Option<String> {
        frame
            .columns()
            .find(|(_, column)| column.dtype() == DType::Datetime)
            .or_else(|| frame.columns().find(|(name, _)| HeaderRole::Date.matches(name)))
            .map(|(name, _)| name.to_owned())
    }
}

pub fn find_link_column(
    frame: &DataFrame,
    classifier: &dyn ColumnClassifier,
) -> Result<String, AnalysisError> {
    classifier
        .link_column(frame)
        .ok_or(AnalysisError::NoLinkColumn)
}

/// Locate the date column and make sure it is typed as datetime. Cells that
/// do not parse become NaT.
pub fn resolve_date_column(
    frame: DataFrame,
    classifier: &dyn ColumnClassifier,
) -> Result<(DataFrame, Option<String>), AnalysisError> {
    let Some(name) = classifier.date_column(&frame) else {
        return Ok((frame, None));
    };
    let column = frame.require_column(&name)?;
    if column.dtype() == DType::Datetime {
        return Ok((frame, Some(name)));
    }

    debug!(column = %name, "coercing date column");
    let coerced = column.to_datetime()?;
    let frame = frame.with_column(&name, coerced)?;
    Ok((frame, Some(name)))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use lf_frame::DataFrame;
    use lf_types::{DType, NullKind, Scalar};

    use super::{ColumnClassifier, NameHeuristicClassifier, find_link_column, resolve_date_column};
    use crate::AnalysisError;

    fn frame(headers: &[&str], row: Vec<Scalar>) -> DataFrame {
        DataFrame::from_rows(
            headers.iter().map(|name| (*name).to_owned()).collect(),
            vec![row],
        )
        .expect("frame")
    }

    #[test]
    fn link_column_prefers_keyword_headers() {
        let classifier = NameHeuristicClassifier;
        let with_keyword = frame(
            &["clicks", "Landing URL"],
            vec![Scalar::Int64(1), Scalar::from("a.com")],
        );
        assert_eq!(
            find_link_column(&with_keyword, &classifier).expect("link"),
            "Landing URL"
        );

        let chinese = frame(&["点击", "推广链接"], vec![Scalar::Int64(1), Scalar::from("a.com")]);
        assert_eq!(classifier.link_column(&chinese).as_deref(), Some("推广链接"));
    }

    #[test]
    fn link_column_falls_back_to_first_column() {
        let plain = frame(&["site", "clicks"], vec![Scalar::from("a.com"), Scalar::Int64(1)]);
        assert_eq!(
            find_link_column(&plain, &NameHeuristicClassifier).expect("link"),
            "site"
        );
        assert!(matches!(
            find_link_column(&DataFrame::empty(), &NameHeuristicClassifier),
            Err(AnalysisError::NoLinkColumn)
        ));
    }

    #[test]
    fn typed_datetime_column_wins_over_names() {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("ts");
        let typed = frame(
            &["Report Date", "when"],
            vec![Scalar::from("yesterday"), Scalar::Datetime(ts)],
        );
        assert_eq!(
            NameHeuristicClassifier.date_column(&typed).as_deref(),
            Some("when")
        );
    }

    #[test]
    fn named_date_column_is_coerced() {
        let named = frame(
            &["link", "统计日期"],
            vec![Scalar::from("a.com"), Scalar::from("2024/05/01")],
        );
        let (out, date) = resolve_date_column(named, &NameHeuristicClassifier).expect("resolve");
        assert_eq!(date.as_deref(), Some("统计日期"));
        assert_eq!(out.column("统计日期").expect("date").dtype(), DType::Datetime);

        let unparseable = frame(&["link", "date"], vec![Scalar::from("a.com"), Scalar::from("soon")]);
        let (out, _) = resolve_date_column(unparseable, &NameHeuristicClassifier).expect("resolve");
        assert_eq!(
            out.column("date").expect("date").values()[0],
            Scalar::Null(NullKind::NaT)
        );
    }

    #[test]
    fn no_date_column_is_not_an_error() {
        let plain = frame(&["link", "ctr"], vec![Scalar::from("a.com"), Scalar::Float64(1.0)]);
        let (_, date) = resolve_date_column(plain, &NameHeuristicClassifier).expect("resolve");
        assert_eq!(date, None);
    }
}
