//! Threshold evaluation of a combined snapshot against the rule set

use super::joiner::CombinedSnapshot;
use indexmap::IndexMap;
use protocol::{Rule, VariableViolation, ViolationReport};

/// One report per enabled rule with at least one variable strictly outside its range.
///
/// Reports follow rule order, variables follow declaration order. Variables
/// missing from the snapshot are skipped.
pub fn evaluate(snapshot: &CombinedSnapshot, rules: &[Rule]) -> Vec<ViolationReport> {
    rules
        .iter()
        .filter(|rule| rule.enabled)
        .filter_map(|rule| {
            let variables: IndexMap<String, VariableViolation> = rule
                .variables
                .iter()
                .filter_map(|(name, threshold)| {
                    let actual = snapshot.get(name)?;
                    threshold.is_violated_by(actual).then(|| {
                        (
                            name.clone(),
                            VariableViolation {
                                actual_value: actual,
                                expected_range: *threshold,
                            },
                        )
                    })
                })
                .collect();

            if variables.is_empty() {
                None
            } else {
                Some(ViolationReport {
                    rule_title: rule.title.clone(),
                    rule_description: rule.description.clone(),
                    variables,
                })
            }
        })
        .collect()
}
