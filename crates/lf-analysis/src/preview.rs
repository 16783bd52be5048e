use lf_frame::DataFrame;
use lf_types::Scalar;
use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::AnalysisError;
use crate::classify::{ColumnClassifier, find_link_column};

pub type JsonRow = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewReport {
    pub columns: Vec<String>,
    pub rows: Vec<JsonRow>,
    pub total_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkDetails {
    pub link: String,
    pub data: Vec<JsonRow>,
    pub total_rows: usize,
}

/// JSON view of a cell: missing values become `null`, timestamps text.
#[must_use]
pub fn scalar_to_json(value: &Scalar) -> Value {
    match value {
        _ if value.is_missing() => Value::Null,
        Scalar::Bool(v) => Value::Bool(*v),
        Scalar::Int64(v) => Value::Number((*v).into()),
        Scalar::Float64(v) => Number::from_f64(*v).map_or(Value::Null, Value::Number),
        other => other.to_text().map_or(Value::Null, Value::String),
    }
}

fn json_row(frame: &DataFrame, idx: usize) -> JsonRow {
    frame
        .row(idx)
        .unwrap_or_default()
        .into_iter()
        .map(|(name, value)| (name.to_owned(), scalar_to_json(value)))
        .collect()
}

/// Header names plus the first `rows` rows.
pub fn preview(frame: &DataFrame, rows: usize) -> Result<PreviewReport, AnalysisError> {
    let head = frame.head(rows)?;
    Ok(PreviewReport {
        columns: frame.column_names().into_iter().map(str::to_owned).collect(),
        rows: (0..head.len()).map(|idx| json_row(&head, idx)).collect(),
        total_rows: frame.len(),
    })
}

/// Every raw row of one entity.
pub fn link_details(
    frame: &DataFrame,
    link: &str,
    classifier: &dyn ColumnClassifier,
) -> Result<LinkDetails, AnalysisError> {
    let link_column = find_link_column(frame, classifier)?;
    let mask: Vec<bool> = frame
        .require_column(&link_column)?
        .values()
        .iter()
        .map(|value| value.to_text().is_some_and(|text| text == link))
        .collect();

    let rows = frame.filter_rows(&mask)?;
    if rows.is_empty() {
        return Err(AnalysisError::UnknownLink(link.to_owned()));
    }
    Ok(LinkDetails {
        link: link.to_owned(),
        data: (0..rows.len()).map(|idx| json_row(&rows, idx)).collect(),
        total_rows: rows.len(),
    })
}

#[cfg(test)]
mod tests {
    use lf_frame::DataFrame;
    use lf_types::{NullKind, Scalar};
    use serde_json::json;

    use super::{link_details, preview};
    use crate::AnalysisError;
    use crate::classify::NameHeuristicClassifier;

    fn sample() -> DataFrame {
        DataFrame::from_rows(
            vec!["link".to_owned(), "ctr".to_owned()],
            vec![
                vec![Scalar::from("a.com"), Scalar::Float64(1.5)],
                vec![Scalar::from("b.com"), Scalar::Null(NullKind::NaN)],
                vec![Scalar::from("a.com"), Scalar::Float64(2.5)],
            ],
        )
        .expect("frame")
    }

    #[test]
    fn preview_limits_rows_and_nulls_missing_cells() {
        let report = preview(&sample(), 2).expect("preview");
        assert_eq!(report.columns, vec!["link", "ctr"]);
        assert_eq!(report.total_rows, 3);
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[1].get("ctr"), Some(&json!(null)));
        assert_eq!(report.rows[0].get("ctr"), Some(&json!(1.5)));
    }

    #[test]
    fn link_details_returns_every_row_of_one_entity() {
        let details = link_details(&sample(), "a.com", &NameHeuristicClassifier).expect("details");
        assert_eq!(details.total_rows, 2);
        assert_eq!(details.data[1].get("ctr"), Some(&json!(2.5)));

        assert!(matches!(
            link_details(&sample(), "c.com", &NameHeuristicClassifier),
            Err(AnalysisError::UnknownLink(link)) if link == "c.com"
        ));
    }
}
