use std::collections::HashSet;

use lf_columnar::ComparisonOp;

use crate::{Condition, FilterRule, RowTrace};

pub const DESCRIPTION_SEPARATOR: &str = " & ";

/// `"{field} {symbol} {value}"`, e.g. `ctr ≥ 4.5`. Unknown operators are
/// rendered as written.
#[must_use]
pub fn describe_condition(condition: &Condition) -> String {
    let symbol = condition
        .comparison()
        .map_or(condition.operator.trim(), |op: ComparisonOp| op.symbol());
    format!("{} {symbol} {}", condition.field, condition.value)
}

struct Satisfied {
    description: String,
    priority: i64,
    group: usize,
    condition: usize,
}

/// Descriptions of every satisfied condition in the matched groups of one
/// row: first occurrence of a description wins, then ordered by
/// `(priority, group, condition)`.
#[must_use]
pub fn assemble_descriptions(rule: &FilterRule, row: &RowTrace) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut satisfied = Vec::new();

    for matched in &row.groups {
        let Some(group) = rule.groups.get(matched.group_index) else {
            continue;
        };
        for &condition_index in &matched.conditions {
            let Some(condition) = group.conditions.get(condition_index) else {
                continue;
            };
            let description = describe_condition(condition);
            if seen.insert(description.clone()) {
                satisfied.push(Satisfied {
                    description,
                    priority: condition.priority,
                    group: matched.group_index,
                    condition: condition_index,
                });
            }
        }
    }

    satisfied.sort_by_key(|item| (item.priority, item.group, item.condition));
    satisfied.into_iter().map(|item| item.description).collect()
}

/// All descriptions of a row joined into one line, `None` when nothing matched.
#[must_use]
pub fn describe_row(rule: &FilterRule, row: &RowTrace) -> Option<String> {
    let descriptions = assemble_descriptions(rule, row);
    (!descriptions.is_empty()).then(|| descriptions.join(DESCRIPTION_SEPARATOR))
}

#[cfg(test)]
mod tests {
    use super::{assemble_descriptions, describe_condition, describe_row};
    use crate::{Condition, FilterRule, Group, GroupMatch, Logic, RowTrace};

    #[test]
    fn conditions_render_with_symbols_and_short_numbers() {
        assert_eq!(describe_condition(&Condition::new("ctr", ">", 5.0)), "ctr > 5");
        assert_eq!(describe_condition(&Condition::new("ctr", ">=", 4.5)), "ctr ≥ 4.5");
        assert_eq!(describe_condition(&Condition::new("收入", "<=", 100.0)), "收入 ≤ 100");
        assert_eq!(describe_condition(&Condition::new("x", "==", 1.0)), "x = 1");
        assert_eq!(describe_condition(&Condition::new("x", "<>", 1.0)), "x ≠ 1");
        assert_eq!(describe_condition(&Condition::new("x", "~", 0.25)), "x ~ 0.25");
    }

    #[test]
    fn descriptions_sort_by_priority_then_position_and_dedupe() {
        let rule = FilterRule::new(
            Logic::Or,
            vec![
                Group::new(
                    Logic::Or,
                    vec![
                        Condition::new("ctr", ">", 5.0).with_priority(2),
                        Condition::new("revenue", ">", 100.0).with_priority(1),
                    ],
                ),
                Group::new(
                    Logic::Or,
                    vec![
                        Condition::new("ctr", ">", 5.0).with_priority(0),
                        Condition::new("clicks", ">", 10.0).with_priority(1),
                    ],
                ),
            ],
        );
        let row = RowTrace {
            source_row: 0,
            groups: vec![
                GroupMatch {
                    group_index: 0,
                    conditions: vec![0, 1],
                },
                GroupMatch {
                    group_index: 1,
                    conditions: vec![0, 1],
                },
            ],
        };

        assert_eq!(
            assemble_descriptions(&rule, &row),
            vec!["revenue > 100", "clicks > 10", "ctr > 5"]
        );
        assert_eq!(
            describe_row(&rule, &row).as_deref(),
            Some("revenue > 100 & clicks > 10 & ctr > 5")
        );
    }

    #[test]
    fn row_without_groups_has_no_description() {
        let rule = FilterRule::new(Logic::Or, Vec::new());
        let row = RowTrace {
            source_row: 3,
            groups: Vec::new(),
        };
        assert!(assemble_descriptions(&rule, &row).is_empty());
        assert_eq!(describe_row(&rule, &row), None);
    }
}
