//! Per-entity reductions: the N-day mean and the latest-day snapshot.

use chrono::TimeDelta;
use lf_columnar::Column;
use lf_frame::DataFrame;
use lf_groupby::{group_rows, groupby_latest, groupby_mean};
use lf_types::{DType, Scalar};
use tracing::debug;

use crate::AnalysisError;

/// Share of rows in the window that must normalize for a column to be averaged.
pub const NUMERIC_THRESHOLD: f64 = 0.5;

/// Mean of every numeric column per entity over the last `days` days.
///
/// The window is `date >= latest - days`; without a date column (or without
/// any parseable date) every row is used. A column counts as numeric when it
/// is typed numeric or when more than half of the windowed rows normalize.
/// Other columns are dropped. One row per entity in first-seen order.
pub fn recent_mean(
    frame: &DataFrame,
    link_column: &str,
    date_column: Option<&str>,
    days: u32,
) -> Result<DataFrame, AnalysisError> {
    let window = match date_column {
        Some(name) => within_days(frame, name, days)?,
        None => frame.clone(),
    };

    let grouping = group_rows(window.require_column(link_column)?);
    let keys = grouping.keys().iter().map(|key| Scalar::from(key.as_str())).collect();
    let mut columns = vec![(link_column.to_owned(), Column::new(DType::Utf8, keys)?)];

    for (name, column) in window.columns() {
        if name == link_column || Some(name) == date_column {
            continue;
        }
        let numeric = matches!(column.dtype(), DType::Int64 | DType::Float64)
            || column.coerce_numeric().row_ratio() > NUMERIC_THRESHOLD;
        if numeric {
            columns.push((name.to_owned(), groupby_mean(&grouping, column)?));
        }
    }

    debug!(
        window_rows = window.len(),
        entities = grouping.len(),
        numeric_columns = columns.len() - 1,
        "computed recent mean"
    );
    Ok(DataFrame::new(columns)?)
}

fn within_days(frame: &DataFrame, date_column: &str, days: u32) -> Result<DataFrame, AnalysisError> {
    let stamps: Vec<_> = frame
        .require_column(date_column)?
        .values()
        .iter()
        .map(Scalar::to_datetime)
        .collect();
    let Some(latest) = stamps.iter().flatten().max().copied() else {
        return Ok(frame.clone());
    };
    let Some(cutoff) = latest.checked_sub_signed(TimeDelta::days(i64::from(days))) else {
        return Ok(frame.clone());
    };

    let mask: Vec<bool> = stamps
        .iter()
        .map(|stamp| stamp.is_some_and(|ts| ts >= cutoff))
        .collect();
    Ok(frame.filter_rows(&mask)?)
}

/// The newest row of every entity. Ties keep the first such row; entities
/// without a dated row are dropped. Without a date column the frame is
/// returned as is.
pub fn latest_snapshot(
    frame: &DataFrame,
    link_column: &str,
    date_column: Option<&str>,
) -> Result<DataFrame, AnalysisError> {
    let Some(date_column) = date_column else {
        return Ok(frame.clone());
    };

    let grouping = group_rows(frame.require_column(link_column)?);
    let positions: Vec<usize> = groupby_latest(&grouping, frame.require_column(date_column)?)?
        .into_iter()
        .flatten()
        .collect();

    debug!(entities = positions.len(), "selected latest rows");
    Ok(frame.take_rows(&positions)?)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use lf_frame::DataFrame;
    use lf_types::{NullKind, Scalar};

    use super::{latest_snapshot, recent_mean};

    fn day(d: u32) -> Scalar {
        Scalar::Datetime(
            NaiveDate::from_ymd_opt(2024, 5, d)
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .expect("date"),
        )
    }

    fn sample() -> DataFrame {
        DataFrame::from_rows(
            vec![
                "link".to_owned(),
                "date".to_owned(),
                "ctr".to_owned(),
                "revenue".to_owned(),
                "note".to_owned(),
            ],
            vec![
                vec![Scalar::from("b.com"), day(1), Scalar::from("9%"), Scalar::from("1,000"), Scalar::from("x")],
                vec![Scalar::from("a.com"), day(8), Scalar::from("4%"), Scalar::from("200"), Scalar::from("y")],
                vec![Scalar::from("b.com"), day(9), Scalar::from("2%"), Scalar::from("300"), Scalar::from("z")],
                vec![Scalar::from("a.com"), day(10), Scalar::from("6%"), Scalar::from("n/a"), Scalar::from("w")],
                vec![Scalar::from("b.com"), day(10), Scalar::from("4%"), Scalar::from("500"), Scalar::from("v")],
            ],
        )
        .expect("frame")
    }

    fn values(frame: &DataFrame, column: &str) -> Vec<Scalar> {
        frame.column(column).expect("column").values().to_vec()
    }

    #[test]
    fn mean_uses_the_window_and_first_seen_order() {
        let out = recent_mean(&sample(), "link", Some("date"), 3).expect("mean");

        assert_eq!(out.column_names(), vec!["link", "ctr", "revenue"]);
        assert_eq!(values(&out, "link"), vec![Scalar::from("a.com"), Scalar::from("b.com")]);
        assert_eq!(values(&out, "ctr"), vec![Scalar::Float64(5.0), Scalar::Float64(3.0)]);
        assert_eq!(
            values(&out, "revenue"),
            vec![Scalar::Float64(200.0), Scalar::Float64(400.0)]
        );
    }

    #[test]
    fn mean_without_dates_uses_every_row() {
        let out = recent_mean(&sample(), "link", None, 3).expect("mean");
        assert_eq!(values(&out, "link"), vec![Scalar::from("b.com"), Scalar::from("a.com")]);
        assert_eq!(values(&out, "ctr")[0], Scalar::Float64(5.0));
    }

    #[test]
    fn entity_without_numbers_gets_nan() {
        let frame = DataFrame::from_rows(
            vec!["link".to_owned(), "clicks".to_owned()],
            vec![
                vec![Scalar::from("a.com"), Scalar::Int64(4)],
                vec![Scalar::from("b.com"), Scalar::Null(NullKind::Null)],
            ],
        )
        .expect("frame");
        let out = recent_mean(&frame, "link", None, 7).expect("mean");
        assert_eq!(values(&out, "clicks"), vec![Scalar::Float64(4.0), Scalar::Null(NullKind::NaN)]);
    }

    #[test]
    fn latest_keeps_one_row_per_entity() {
        let out = latest_snapshot(&sample(), "link", Some("date")).expect("latest");
        assert_eq!(values(&out, "link"), vec![Scalar::from("b.com"), Scalar::from("a.com")]);
        assert_eq!(values(&out, "note"), vec![Scalar::from("v"), Scalar::from("w")]);

        let unchanged = latest_snapshot(&sample(), "link", None).expect("latest");
        assert_eq!(unchanged, sample());
    }
}
