//! Numeric normalization for spreadsheet cells.
//!
//! Exported reports mix `4.5%`, `1,234,567.89` and `1.234.567` freely within
//! one column. Everything numeric in linkfilter goes through this module so
//! rule evaluation, aggregation and CTR extraction agree on what a cell means.
//!
//! Known limitation: a trailing three-digit group after two or more dots is
//! always read as thousands, so `1.234.567` is 1234567 even if the author
//! meant 1234.567.

use std::sync::LazyLock;

use regex::Regex;

use crate::{DType, Scalar, TypeError};

static COMMA_THOUSANDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{1,3}(,\d{3})*(\.\d+)?$").expect("comma thousands pattern is valid")
});

/// Strip percent signs and whitespace, then resolve thousands separators.
#[must_use]
pub fn clean_numeric_text(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .filter(|c| *c != '%' && !c.is_whitespace())
        .collect();

    let (sign, body) = match stripped.strip_prefix(['-', '+']) {
        Some(rest) => (&stripped[..1], rest),
        None => ("", stripped.as_str()),
    };

    if COMMA_THOUSANDS.is_match(body) {
        return format!("{sign}{}", body.replace(',', ""));
    }
    if let Some(regrouped) = regroup_dot_thousands(body) {
        return format!("{sign}{regrouped}");
    }
    stripped
}

/// Dot-separated thousands (`1.234.567`, `1.234.567,89`, `1.234,5`).
///
/// A single dot without a comma decimal part stays a decimal point. A comma
/// decimal part is kept as the fraction: `1.234.567,89` reads as `1234567.89`.
fn regroup_dot_thousands(body: &str) -> Option<String> {
    let (int_part, decimal) = match body.split_once(',') {
        Some((int_part, decimal)) => (int_part, Some(decimal)),
        None => (body, None),
    };
    if decimal.is_some_and(|decimal| !is_digits(decimal)) {
        return None;
    }

    let groups: Vec<&str> = int_part.split('.').collect();
    if groups.len() < 2 {
        return None;
    }
    let first = groups[0];
    let last = groups[groups.len() - 1];
    if !is_digits(first) || first.len() > 3 || !is_digits(last) {
        return None;
    }
    if !groups[1..groups.len() - 1]
        .iter()
        .all(|group| group.len() == 3 && is_digits(group))
    {
        return None;
    }

    if let Some(decimal) = decimal {
        if last.len() != 3 {
            return None;
        }
        return Some(format!("{}.{decimal}", groups.concat()));
    }

    if groups.len() < 3 {
        return None;
    }
    if last.len() == 3 {
        Some(groups.concat())
    } else {
        Some(format!("{}.{last}", groups[..groups.len() - 1].concat()))
    }
}

fn is_digits(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

pub fn parse_numeric_text(raw: &str) -> Result<f64, TypeError> {
    let cleaned = clean_numeric_text(raw);
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(TypeError::NonNumericValue {
            value: raw.to_owned(),
            dtype: DType::Utf8,
        }),
    }
}

/// Numeric view of any cell: numbers pass through, text is cleaned and parsed.
pub fn normalize_numeric(value: &Scalar) -> Result<f64, TypeError> {
    match value {
        Scalar::Float64(v) if v.is_nan() => Err(TypeError::ValueIsMissing {
            kind: crate::NullKind::NaN,
        }),
        Scalar::Utf8(text) => parse_numeric_text(text),
        other => other.to_f64(),
    }
}

/// CTR values below 1 are fractions and get promoted to percentage points.
#[must_use]
pub fn promote_ctr(value: f64) -> f64 {
    if value < 1.0 { value * 100.0 } else { value }
}

pub fn normalize_ctr(value: &Scalar) -> Result<f64, TypeError> {
    normalize_numeric(value).map(promote_ctr)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{clean_numeric_text, normalize_ctr, normalize_numeric, parse_numeric_text};
    use crate::{NullKind, Scalar, TypeError};

    fn approx(left: f64, right: f64) -> bool {
        (left - right).abs() < 1e-9
    }

    #[test]
    fn comma_thousands_are_removed() {
        assert_eq!(clean_numeric_text("1,234,567.89"), "1234567.89");
        assert!(approx(
            parse_numeric_text("1,234,567.89").expect("parse"),
            1_234_567.89
        ));
        assert_eq!(clean_numeric_text("-12,000"), "-12000");
    }

    #[test]
    fn dot_thousands_follow_the_trailing_group_heuristic() {
        assert_eq!(clean_numeric_text("1.234.567"), "1234567");
        assert_eq!(clean_numeric_text("1.234.56"), "1234.56");
        assert_eq!(clean_numeric_text("1.234.567,89"), "1234567.89");
        assert_eq!(clean_numeric_text("1.234,5"), "1234.5");
        assert!(approx(
            parse_numeric_text("1.234.567").expect("parse"),
            1_234_567.0
        ));
    }

    #[test]
    fn single_dot_stays_a_decimal_point() {
        assert_eq!(clean_numeric_text("0.045"), "0.045");
        assert_eq!(clean_numeric_text("1.234"), "1.234");
        assert_eq!(clean_numeric_text("1234.5"), "1234.5");
    }

    #[test]
    fn percent_and_whitespace_are_stripped() {
        assert!(approx(parse_numeric_text(" 4.5 % ").expect("parse"), 4.5));
        assert!(approx(
            normalize_numeric(&Scalar::from("4.5%")).expect("normalize"),
            4.5
        ));
    }

    #[test]
    fn ctr_convention_promotes_fractions_only() {
        assert!(approx(normalize_ctr(&Scalar::from("4.5%")).expect("ctr"), 4.5));
        assert!(approx(normalize_ctr(&Scalar::from("0.045")).expect("ctr"), 4.5));
        assert!(approx(normalize_ctr(&Scalar::from("45")).expect("ctr"), 45.0));
        assert!(approx(normalize_ctr(&Scalar::Float64(1.0)).expect("ctr"), 1.0));
    }

    #[test]
    fn non_numeric_text_and_missing_values_fail() {
        assert!(matches!(
            parse_numeric_text("n/a"),
            Err(TypeError::NonNumericValue { .. })
        ));
        assert!(parse_numeric_text("").is_err());
        assert!(parse_numeric_text("inf").is_err());
        assert!(parse_numeric_text("12,5").is_err());
        assert_eq!(
            normalize_numeric(&Scalar::Null(NullKind::Null)),
            Err(TypeError::ValueIsMissing {
                kind: NullKind::Null
            })
        );
        assert!(normalize_numeric(&Scalar::Float64(f64::NAN)).is_err());
    }

    fn group_thousands(value: u64, separator: char) -> String {
        let digits = value.to_string();
        let mut out = String::new();
        for (idx, ch) in digits.chars().enumerate() {
            if idx > 0 && (digits.len() - idx) % 3 == 0 {
                out.push(separator);
            }
            out.push(ch);
        }
        out
    }

    proptest! {
        #[test]
        fn comma_grouped_integers_parse_back(value in 0_u64..1_000_000_000_000) {
            let text = group_thousands(value, ',');
            prop_assert_eq!(parse_numeric_text(&text).expect("parse"), value as f64);
        }

        #[test]
        fn comma_grouped_decimals_parse_back(value in 0_u64..1_000_000_000, cents in 0_u64..100) {
            let text = format!("{}.{cents:02}", group_thousands(value, ','));
            let expected = value as f64 + cents as f64 / 100.0;
            let parsed = parse_numeric_text(&text).expect("parse");
            prop_assert!((parsed - expected).abs() < 1e-6);
        }

        #[test]
        fn dot_grouped_millions_parse_back(value in 1_000_000_u64..1_000_000_000_000) {
            let text = group_thousands(value, '.');
            prop_assert_eq!(parse_numeric_text(&text).expect("parse"), value as f64);
        }

        #[test]
        fn cleaning_is_idempotent(raw in "[0-9.,% -]{0,16}") {
            let once = clean_numeric_text(&raw);
            prop_assert_eq!(clean_numeric_text(&once), once);
        }
    }
}
