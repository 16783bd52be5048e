//! Entity records: rule matches turned into ranked, describable rows.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use lf_frame::DataFrame;
use lf_rules::{DESCRIPTION_SEPARATOR, FilterRule, RuleOutcome, assemble_descriptions};
use lf_types::{HeaderRole, Scalar, fold_case, normalize_ctr, normalize_numeric, promote_ctr};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// Prefix for descriptions that only the latest-day pass satisfied.
pub const LATEST_MATCH_PREFIX: &str = "[最新数据满足]";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    fn from_cell(value: &Scalar) -> Option<Self> {
        match value {
            _ if value.is_missing() => None,
            Scalar::Utf8(text) => Some(Self::Text(text.clone())),
            Scalar::Datetime(_) => value.to_text().map(Self::Text),
            other => other.to_f64().ok().map(Self::Number),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub link: String,
    pub ctr: Option<f64>,
    pub revenue: Option<f64>,
    pub latest_revenue: Option<f64>,
    #[serde(rename = "data")]
    pub raw_fields: BTreeMap<String, FieldValue>,
    pub matched_groups: Vec<usize>,
    pub matched_rules: Vec<String>,
    pub is_latest_data_match: bool,
    /// Individual condition descriptions behind `matched_rules`.
    #[serde(skip)]
    pub conditions: Vec<String>,
}

/// Archival form of a record: numbers as decimal strings so replaying a
/// snapshot never re-encodes a float.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub link: String,
    pub ctr: Option<String>,
    pub revenue: Option<String>,
    pub latest_revenue: Option<String>,
    pub matched_rules: Vec<String>,
    pub is_latest_data_match: bool,
}

impl EntityRecord {
    #[must_use]
    pub fn to_snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            link: self.link.clone(),
            ctr: self.ctr.map(decimal_string),
            revenue: self.revenue.map(decimal_string),
            latest_revenue: self.latest_revenue.map(decimal_string),
            matched_rules: self.matched_rules.clone(),
            is_latest_data_match: self.is_latest_data_match,
        }
    }
}

fn decimal_string(value: f64) -> String {
    value.to_string()
}

/// CTR and revenue of one row: the last non-empty matching column wins.
fn extract_metrics(row: &[(&str, &Scalar)], link_column: &str) -> (Option<f64>, Option<f64>) {
    let mut ctr = None;
    let mut revenue = None;
    for (name, value) in row {
        if *name == link_column || value.is_missing() {
            continue;
        }
        if HeaderRole::Ctr.matches(name) {
            ctr = normalize_ctr(value).ok();
        }
        if HeaderRole::Revenue.matches(name) {
            revenue = normalize_numeric(value).ok();
        }
    }
    (ctr, revenue)
}

/// Value of a rule field in one row: the first column whose name equals the
/// field or contains it (either way, case-insensitively) with a non-empty
/// cell. CTR fields are promoted to percentage points.
fn rule_field_value(row: &[(&str, &Scalar)], field: &str) -> Option<FieldValue> {
    let folded_field = fold_case(field);
    row.iter().find_map(|(name, value)| {
        let folded_name = fold_case(name);
        let related = *name == field
            || folded_name.contains(&folded_field)
            || folded_field.contains(&folded_name);
        if !related || value.is_missing() {
            return None;
        }
        match normalize_numeric(value) {
            Ok(number) if HeaderRole::Ctr.matches(field) || HeaderRole::Ctr.matches(name) => {
                Some(FieldValue::Number(promote_ctr(number)))
            }
            Ok(number) => Some(FieldValue::Number(number)),
            Err(_) => FieldValue::from_cell(value),
        }
    })
}

/// One record per retained row of `outcome`, in row order.
#[must_use]
pub fn build_records(outcome: &RuleOutcome, rule: &FilterRule, link_column: &str) -> Vec<EntityRecord> {
    let fields = rule.fields();
    let frame = &outcome.rows;

    (0..frame.len())
        .filter_map(|idx| {
            let row = frame.row(idx)?;
            let link = row
                .iter()
                .find(|(name, _)| *name == link_column)
                .and_then(|(_, value)| value.to_text())?;

            let (ctr, revenue) = extract_metrics(&row, link_column);
            let mut raw_fields: BTreeMap<String, FieldValue> = row
                .iter()
                .filter(|(name, _)| *name != link_column)
                .filter_map(|(name, value)| Some(((*name).to_owned(), FieldValue::from_cell(value)?)))
                .collect();
            for field in &fields {
                if let Some(value) = rule_field_value(&row, field) {
                    raw_fields.insert(field.clone(), value);
                }
            }

            let trace = outcome.trace.get(idx);
            let conditions = trace.map(|trace| assemble_descriptions(rule, trace)).unwrap_or_default();
            let matched_rules = if conditions.is_empty() {
                Vec::new()
            } else {
                vec![conditions.join(DESCRIPTION_SEPARATOR)]
            };

            Some(EntityRecord {
                link,
                ctr,
                revenue,
                latest_revenue: None,
                raw_fields,
                matched_groups: trace.map(|trace| trace.group_indices()).unwrap_or_default(),
                matched_rules,
                is_latest_data_match: false,
                conditions,
            })
        })
        .collect()
}

/// Revenue per entity in a (latest-day) frame; first row of an entity wins.
#[must_use]
pub fn revenue_by_link(frame: &DataFrame, link_column: &str) -> HashMap<String, f64> {
    let mut out = HashMap::new();
    for idx in 0..frame.len() {
        let Some(row) = frame.row(idx) else { continue };
        let Some(link) = row
            .iter()
            .find(|(name, _)| *name == link_column)
            .and_then(|(_, value)| value.to_text())
        else {
            continue;
        };
        if let (_, Some(revenue)) = extract_metrics(&row, link_column) {
            out.entry(link).or_insert(revenue);
        }
    }
    out
}

fn prefixed(description: &str) -> String {
    format!("{LATEST_MATCH_PREFIX} {description}")
}

/// Fold latest-day matches into the mean-pass records.
///
/// Entities only the latest pass matched are appended, flagged and with
/// every description prefixed. Entities matched by both passes get their
/// missing latest revenue filled in and any extra latest-pass conditions
/// appended, prefixed, without repeating a description.
#[must_use]
pub fn merge_latest(
    mean_records: Vec<EntityRecord>,
    latest_records: Vec<EntityRecord>,
    latest_revenue: &HashMap<String, f64>,
) -> Vec<EntityRecord> {
    let mut merged = mean_records;
    let mut index: HashMap<String, usize> = HashMap::with_capacity(merged.len());
    for (pos, record) in merged.iter_mut().enumerate() {
        if record.latest_revenue.is_none() {
            record.latest_revenue = latest_revenue.get(&record.link).copied();
        }
        index.entry(record.link.clone()).or_insert(pos);
    }

    for mut latest in latest_records {
        if let Some(&pos) = index.get(&latest.link) {
            let target = &mut merged[pos];
            if target.latest_revenue.is_none() {
                target.latest_revenue = latest.revenue;
            }
            let known: HashSet<String> = target.conditions.iter().cloned().collect();
            for extra in latest.conditions.into_iter().filter(|d| !known.contains(d)) {
                let description = prefixed(&extra);
                if !target.matched_rules.contains(&description) {
                    target.matched_rules.push(description);
                }
                target.conditions.push(extra);
            }
            continue;
        }

        latest.is_latest_data_match = true;
        latest.matched_rules = latest.matched_rules.iter().map(|d| prefixed(d)).collect();
        if latest.latest_revenue.is_none() {
            latest.latest_revenue = latest_revenue.get(&latest.link).copied().or(latest.revenue);
        }
        index.insert(latest.link.clone(), merged.len());
        merged.push(latest);
    }
    merged
}

static HAS_SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://").expect("scheme pattern is valid")
});

/// Host of `link` without `www.`, reduced to its last two labels. Links
/// without a leading `scheme://` are read as `http://`. Internationalized
/// hosts stay in Unicode rather than punycode. Links that do not parse are
/// returned unchanged.
#[must_use]
pub fn root_domain(link: &str) -> String {
    let trimmed = link.trim();
    let parsed = if HAS_SCHEME.is_match(trimmed) {
        Url::parse(trimmed)
    } else {
        Url::parse(&format!("http://{trimmed}"))
    };
    let Some(host) = parsed.ok().and_then(|url| url.host_str().map(unicode_host)) else {
        return link.to_owned();
    };

    let host = host.strip_prefix("www.").unwrap_or(&host);
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        host.to_owned()
    } else {
        labels[labels.len() - 2..].join(".")
    }
}

fn unicode_host(host: &str) -> String {
    match idna::domain_to_unicode(host) {
        (unicode, Ok(())) => unicode,
        (_, Err(_)) => host.to_owned(),
    }
}

fn descending_nulls_last(left: Option<f64>, right: Option<f64>) -> Ordering {
    match (left, right) {
        (Some(l), Some(r)) => r.total_cmp(&l),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Stable sort: root domain ascending, then CTR and revenue descending with
/// missing values last.
pub fn sort_records(records: &mut [EntityRecord]) {
    records.sort_by(|left, right| {
        root_domain(&left.link)
            .cmp(&root_domain(&right.link))
            .then_with(|| descending_nulls_last(left.ctr, right.ctr))
            .then_with(|| descending_nulls_last(left.revenue, right.revenue))
    });
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use lf_frame::DataFrame;
    use lf_rules::{Condition, FilterRule, Group, Logic, evaluate};
    use lf_runtime::DiagnosticLedger;
    use lf_types::Scalar;
    use proptest::prelude::*;

    use super::{
        EntityRecord, FieldValue, LATEST_MATCH_PREFIX, build_records, merge_latest, root_domain,
        sort_records,
    };

    fn record(link: &str, ctr: Option<f64>, revenue: Option<f64>) -> EntityRecord {
        EntityRecord {
            link: link.to_owned(),
            ctr,
            revenue,
            latest_revenue: None,
            raw_fields: BTreeMap::new(),
            matched_groups: Vec::new(),
            matched_rules: Vec::new(),
            is_latest_data_match: false,
            conditions: Vec::new(),
        }
    }

    fn matched(link: &str, conditions: &[&str]) -> EntityRecord {
        let mut out = record(link, None, None);
        out.conditions = conditions.iter().map(|c| (*c).to_owned()).collect();
        out.matched_rules = vec![out.conditions.join(" & ")];
        out
    }

    #[test]
    fn root_domain_strips_www_and_subdomains() {
        assert_eq!(root_domain("https://www.example.com/a?b=1"), "example.com");
        assert_eq!(root_domain("news.sub.example.co"), "example.co");
        assert_eq!(root_domain("HTTP://WWW.Example.COM"), "example.com");
        assert_eq!(root_domain("localhost"), "localhost");
        assert_eq!(root_domain("http://"), "http://");
    }

    #[test]
    fn root_domain_handles_schemeless_links_with_paths_ports_and_queries() {
        assert_eq!(root_domain("foo.com/r?u=https://bar.com"), "foo.com");
        assert_eq!(root_domain("sub.a.com/p?next=http://b.com"), "a.com");
        assert_eq!(root_domain("a.com:8080/x"), "a.com");
        assert_eq!(root_domain("https://shop.a.com:8443/cart"), "a.com");
        assert_eq!(root_domain("http://www.例子.com/页面"), "例子.com");
    }

    #[test]
    fn embedded_urls_do_not_split_a_domain_group() {
        let mut records = vec![
            record("foo.com/a", Some(1.0), None),
            record("zzz.com/b", Some(5.0), None),
            record("foo.com/r?u=https://bar.com", Some(9.0), None),
            record("https://www.foo.com:8080/c", Some(4.0), None),
        ];
        sort_records(&mut records);
        let order: Vec<&str> = records.iter().map(|r| r.link.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "foo.com/r?u=https://bar.com",
                "https://www.foo.com:8080/c",
                "foo.com/a",
                "zzz.com/b",
            ]
        );
    }

    #[test]
    fn sort_groups_domains_then_ranks_ctr_and_revenue() {
        let mut records = vec![
            record("https://b.com/1", Some(3.0), None),
            record("https://a.com/1", None, Some(900.0)),
            record("https://a.com/2", Some(2.0), Some(10.0)),
            record("https://a.com/3", Some(2.0), Some(50.0)),
            record("https://www.a.com/4", Some(7.0), None),
        ];
        sort_records(&mut records);
        let order: Vec<&str> = records.iter().map(|r| r.link.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "https://www.a.com/4",
                "https://a.com/3",
                "https://a.com/2",
                "https://a.com/1",
                "https://b.com/1",
            ]
        );
    }

    #[test]
    fn latest_only_entities_are_flagged_and_prefixed() {
        let mut revenue = HashMap::new();
        revenue.insert("a.com".to_owned(), 12.0);
        revenue.insert("b.com".to_owned(), 34.0);

        let merged = merge_latest(
            vec![matched("a.com", &["ctr > 5"])],
            vec![matched("b.com", &["ctr > 5", "revenue > 10"])],
            &revenue,
        );

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].latest_revenue, Some(12.0));
        assert!(!merged[0].is_latest_data_match);

        let latest_only = &merged[1];
        assert!(latest_only.is_latest_data_match);
        assert_eq!(latest_only.latest_revenue, Some(34.0));
        assert!(
            latest_only
                .matched_rules
                .iter()
                .all(|rule| rule.starts_with(LATEST_MATCH_PREFIX))
        );
    }

    #[test]
    fn shared_entities_gain_only_new_latest_conditions() {
        let mut latest = matched("a.com", &["ctr > 5", "revenue > 10"]);
        latest.revenue = Some(55.0);

        let merged = merge_latest(
            vec![matched("a.com", &["ctr > 5"])],
            vec![latest],
            &HashMap::new(),
        );

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].latest_revenue, Some(55.0));
        assert_eq!(
            merged[0].matched_rules,
            vec![
                "ctr > 5".to_owned(),
                format!("{LATEST_MATCH_PREFIX} revenue > 10"),
            ]
        );
    }

    #[test]
    fn records_carry_metrics_descriptions_and_rule_fields() {
        let frame = DataFrame::from_rows(
            vec![
                "链接".to_owned(),
                "CTR".to_owned(),
                "预估收益".to_owned(),
                "note".to_owned(),
            ],
            vec![vec![
                Scalar::from("https://a.com"),
                Scalar::Float64(0.062),
                Scalar::from("1,500"),
                Scalar::from("ok"),
            ]],
        )
        .expect("frame");
        let rule = FilterRule::new(
            Logic::Or,
            vec![Group::new(
                Logic::And,
                vec![
                    Condition::new("CTR", ">", 0.05),
                    Condition::new("预估收益", ">=", 1000.0).with_priority(-1),
                ],
            )],
        );

        let mut ledger = DiagnosticLedger::new();
        let outcome = evaluate(&frame, &rule, &mut ledger).expect("evaluate");
        let records = build_records(&outcome, &rule, "链接");

        assert_eq!(records.len(), 1);
        let only = &records[0];
        assert_eq!(only.link, "https://a.com");
        assert!(only.ctr.is_some_and(|ctr| (ctr - 6.2).abs() < 1e-9));
        assert_eq!(only.revenue, Some(1500.0));
        assert_eq!(only.matched_groups, vec![0]);
        assert_eq!(only.matched_rules, vec!["预估收益 ≥ 1000 & CTR > 0.05".to_owned()]);
        assert_eq!(only.raw_fields.get("note"), Some(&FieldValue::Text("ok".to_owned())));
        assert_eq!(only.raw_fields.get("预估收益"), Some(&FieldValue::Number(1500.0)));
        assert!(matches!(
            only.raw_fields.get("CTR"),
            Some(FieldValue::Number(ctr)) if (ctr - 6.2).abs() < 1e-9
        ));
        assert!(!only.raw_fields.contains_key("链接"));

        let snapshot = only.to_snapshot();
        assert_eq!(snapshot.revenue.as_deref(), Some("1500"));
    }

    proptest! {
        #[test]
        fn sorted_records_rank_ctr_within_each_domain(
            rows in proptest::collection::vec((0_u8..3, proptest::option::of(0_u8..5), 0_u8..5), 0..16),
        ) {
            let mut records: Vec<EntityRecord> = rows
                .iter()
                .enumerate()
                .map(|(idx, (domain, ctr, revenue))| {
                    record(
                        &format!("https://p{idx}.d{domain}.com"),
                        ctr.map(f64::from),
                        Some(f64::from(*revenue)),
                    )
                })
                .collect();
            sort_records(&mut records);

            for pair in records.windows(2) {
                let (left, right) = (&pair[0], &pair[1]);
                let (left_domain, right_domain) = (root_domain(&left.link), root_domain(&right.link));
                prop_assert!(left_domain <= right_domain);
                if left_domain == right_domain {
                    prop_assert!(!(left.ctr.is_none() && right.ctr.is_some()));
                    if let (Some(l), Some(r)) = (left.ctr, right.ctr) {
                        prop_assert!(l >= r);
                    }
                }
            }

            let again = {
                let mut copy = records.clone();
                sort_records(&mut copy);
                copy
            };
            prop_assert_eq!(again, records);
        }
    }
}
