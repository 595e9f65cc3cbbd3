use crate::ast::RuleType;
use crate::error::Diagnostic;
use crate::symbols::{PolicyRule, SymbolTable};
use std::collections::{BTreeMap, HashSet};

/// Actions both rules cover; `*` on one side yields the other side's set.
fn shared_actions(a: &PolicyRule, b: &PolicyRule) -> Vec<String> {
    let a_all = a.actions.iter().any(|x| x == "*");
    let b_all = b.actions.iter().any(|x| x == "*");
    match (a_all, b_all) {
        (true, true) => vec!["*".to_owned()],
        (true, false) => b.actions.clone(),
        (false, true) => a.actions.clone(),
        (false, false) => a
            .actions
            .iter()
            .filter(|x| b.actions.contains(x))
            .cloned()
            .collect(),
    }
}

/// Warn about ALLOW/DENY pairs on the same resource whose actions overlap.
/// DENY wins at enforcement time, so this is advisory.
pub(super) fn check_conflicts(table: &SymbolTable, diags: &mut Vec<Diagnostic>) {
    let mut by_resource: BTreeMap<&str, Vec<&PolicyRule>> = BTreeMap::new();
    for rule in table.rules() {
        by_resource
            .entry(rule.resource_pattern.as_str())
            .or_default()
            .push(rule);
    }

    let mut reported = HashSet::new();
    for (resource, rules) in by_resource {
        let allows = rules.iter().filter(|r| r.rule_type == RuleType::Allow);
        for allow in allows {
            for deny in rules.iter().filter(|r| r.rule_type == RuleType::Deny) {
                let shared = shared_actions(allow, deny);
                if shared.is_empty() {
                    continue;
                }
                if !reported.insert((resource, allow.line_number, deny.line_number)) {
                    continue;
                }
                diags.push(Diagnostic::warning(
                    deny.line_number,
                    format!(
                        "Conflicting policies on resource '{}': ALLOW at line {} and DENY at line {} both cover [{}]; DENY overrides",
                        resource,
                        allow.line_number,
                        deny.line_number,
                        shared.join(", ")
                    ),
                ));
            }
        }
    }
}
