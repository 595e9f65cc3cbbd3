use crate::cache::{CacheKey, CacheKeyMode, DecisionCache};
use crate::condition::{evaluate_condition, Context};
use crate::decision::{AccessRequest, Decision, EvaluationStep, Explanation};
use rpl_core::pattern::WildcardPattern;
use rpl_core::{PolicyRule, RuleOrigin, RuleType, SymbolTable};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// Batches at or below this size are evaluated on the calling thread.
const SEQUENTIAL_BATCH_LIMIT: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Role-derived rules match only subjects holding that role.
    pub subject_scoping: bool,
    pub cache_key: CacheKeyMode,
}

/// A rule with its resource pattern compiled once.
#[derive(Debug)]
struct CompiledRule {
    rule: PolicyRule,
    pattern: WildcardPattern,
}

/// Outcome of testing one rule, kept for explanations.
struct RuleCheck {
    action_matched: bool,
    resource_matched: bool,
    condition_passed: Option<bool>,
    condition_error: Option<String>,
}

impl RuleCheck {
    fn matched(&self) -> bool {
        self.action_matched && self.resource_matched && self.condition_passed != Some(false)
    }
}

/// Evaluates access requests against one compiled policy. Thread-safe; the
/// decision cache is the only mutable state.
#[derive(Debug)]
pub struct PolicyEngine {
    table: SymbolTable,
    rules: Vec<CompiledRule>,
    options: EngineOptions,
    cache: DecisionCache,
}

impl PolicyEngine {
    pub fn new(table: SymbolTable) -> Self {
        PolicyEngine::with_options(table, EngineOptions::default())
    }

    pub fn with_options(table: SymbolTable, options: EngineOptions) -> Self {
        let rules: Vec<CompiledRule> = table
            .rules()
            .iter()
            .map(|rule| CompiledRule {
                pattern: WildcardPattern::new(&rule.resource_pattern),
                rule: rule.clone(),
            })
            .collect();
        info!(
            event = "Engine",
            phase = "Initialized",
            rules = rules.len(),
            subject_scoping = options.subject_scoping,
            cache_key = ?options.cache_key,
        );
        PolicyEngine {
            table,
            rules,
            options,
            cache: DecisionCache::new(),
        }
    }

    pub fn symbol_table(&self) -> &SymbolTable {
        &self.table
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn cached_decisions(&self) -> usize {
        self.cache.len()
    }

    /// Decide one request. A cached decision for the same key is returned
    /// unchanged.
    pub fn check_access(
        &self,
        subject: &str,
        action: &str,
        resource: &str,
        context: &Context,
    ) -> Decision {
        let key = CacheKey::new(self.options.cache_key, subject, action, resource, context);
        if let Some(decision) = self.cache.get(&key) {
            debug!(event = "Enforce", phase = "CacheHit", subject, action, resource);
            return decision;
        }

        let request = AccessRequest {
            subject: subject.to_owned(),
            action: action.to_owned(),
            resource: resource.to_owned(),
            context: context.clone(),
        };
        let (decision, _) = self.evaluate(&request, false);
        info!(
            event = "Enforce",
            phase = "Decided",
            subject,
            action,
            resource,
            allowed = decision.allowed,
            matched = decision.matched_rules.len(),
            reason = %decision.reason,
        );
        self.cache.insert(key, decision.clone());
        decision
    }

    pub fn check(&self, request: &AccessRequest) -> Decision {
        self.check_access(
            &request.subject,
            &request.action,
            &request.resource,
            &request.context,
        )
    }

    /// Decide each request independently; results keep request order.
    /// Larger batches are spread across threads, sharing only the cache.
    pub fn batch_check_access(&self, requests: &[AccessRequest]) -> Vec<Decision> {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        if requests.len() <= SEQUENTIAL_BATCH_LIMIT || workers < 2 {
            return requests.iter().map(|r| self.check(r)).collect();
        }

        let chunk_size = requests.len().div_ceil(workers);
        debug!(event = "Enforce", phase = "Batch", requests = requests.len(), workers, chunk_size);
        std::thread::scope(|scope| {
            let handles: Vec<_> = requests
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || chunk.iter().map(|r| self.check(r)).collect::<Vec<_>>())
                })
                .collect();
            handles
                .into_iter()
                .zip(requests.chunks(chunk_size))
                .flat_map(|(handle, chunk)| {
                    // A panicking worker fails closed for its chunk.
                    handle.join().unwrap_or_else(|_| {
                        chunk
                            .iter()
                            .map(|r| Decision::denied(r, "Evaluation failed"))
                            .collect()
                    })
                })
                .collect()
        })
    }

    /// Drop every memoized decision.
    pub fn clear_cache(&self) {
        let dropped = self.cache.len();
        self.cache.clear();
        info!(event = "Engine", phase = "CacheCleared", dropped);
    }

    /// Evaluate without the cache and report how every rule fared.
    pub fn explain(&self, request: &AccessRequest) -> Explanation {
        let (decision, steps) = self.evaluate(request, true);
        Explanation {
            decision,
            evaluated_rules: steps.len(),
            steps,
        }
    }

    fn evaluate(&self, request: &AccessRequest, trace: bool) -> (Decision, Vec<EvaluationStep>) {
        let action = request.action.to_lowercase();
        let subject_roles = self.subject_roles(&request.subject);

        let mut matched = Vec::new();
        let mut steps = Vec::new();
        for compiled in &self.rules {
            if !self.applies_to_subject(&compiled.rule, subject_roles.as_ref()) {
                continue;
            }
            let check = self.check_rule(compiled, &action, request, trace);
            if check.matched() {
                matched.push(compiled.rule.clone());
            }
            if trace {
                steps.push(EvaluationStep {
                    line: compiled.rule.line_number,
                    rule_type: compiled.rule.rule_type,
                    resource_pattern: compiled.rule.resource_pattern.clone(),
                    action_matched: check.action_matched,
                    resource_matched: check.resource_matched,
                    condition_passed: check.condition_passed,
                    condition_error: check.condition_error.clone(),
                    matched: check.matched(),
                });
            }
        }
        (Decision::resolve(request, matched), steps)
    }

    fn check_rule(
        &self,
        compiled: &CompiledRule,
        action: &str,
        request: &AccessRequest,
        trace: bool,
    ) -> RuleCheck {
        let action_matched = compiled.rule.covers_action(action);
        let resource_matched = compiled.pattern.matches(&request.resource);
        let mut check = RuleCheck {
            action_matched,
            resource_matched,
            condition_passed: None,
            condition_error: None,
        };
        // Conditions are only evaluated for otherwise matching rules.
        if !(action_matched && resource_matched) {
            return check;
        }
        if let Some(condition) = &compiled.rule.condition {
            match evaluate_condition(condition, &request.context) {
                Ok(passed) => check.condition_passed = Some(passed),
                Err(e) => {
                    debug!(
                        event = "Enforce",
                        phase = "ConditionUnevaluable",
                        line = compiled.rule.line_number,
                        error = %e,
                    );
                    // Unevaluable: an ALLOW does not grant, a DENY still denies.
                    check.condition_passed = Some(compiled.rule.rule_type == RuleType::Deny);
                    if trace {
                        check.condition_error = Some(e.to_string());
                    }
                }
            }
        }
        check
    }

    /// Effective roles of the subject when scoping is on.
    fn subject_roles(&self, subject: &str) -> Option<HashSet<String>> {
        self.options
            .subject_scoping
            .then(|| self.table.effective_roles(subject).into_iter().collect())
    }

    fn applies_to_subject(&self, rule: &PolicyRule, roles: Option<&HashSet<String>>) -> bool {
        match (&rule.origin, roles) {
            (RuleOrigin::Role(role), Some(roles)) => roles.contains(role),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{REASON_ALLOWED, REASON_DEFAULT_DENY, REASON_DENIED};
    use rpl_core::{compile, CompileMode, CompileOptions};
    use serde_json::json;

    fn engine(src: &str) -> PolicyEngine {
        engine_with(src, EngineOptions::default())
    }

    fn engine_with(src: &str, options: EngineOptions) -> PolicyEngine {
        let result = compile(src, &CompileOptions::with_mode(CompileMode::Validate));
        assert!(result.success, "{:?}", result.errors);
        PolicyEngine::with_options(result.symbol_table.unwrap_or_default(), options)
    }

    fn ctx(v: serde_json::Value) -> Context {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn deny_overrides_allow() {
        let e = engine(
            "ROLE Ops { can: [read, delete] resources: [db.*] }\n\
             DENY action: delete ON resource: db.orders",
        );
        let d = e.check_access("anyone", "delete", "db.orders", &Context::new());
        assert!(!d.allowed);
        assert_eq!(d.reason, REASON_DENIED);
        assert_eq!(d.matched_rules.len(), 2);

        let d = e.check_access("anyone", "read", "db.orders", &Context::new());
        assert!(d.allowed);
        assert_eq!(d.reason, REASON_ALLOWED);
    }

    #[test]
    fn default_deny_without_matches() {
        let e = engine("ROLE Ops { can: [read] resources: [db.*] }");
        let d = e.check_access("bob", "read", "other.orders", &Context::new());
        assert!(!d.allowed);
        assert_eq!(d.reason, REASON_DEFAULT_DENY);
        assert!(d.matched_rules.is_empty());
        assert_eq!(d.subject, "bob");
        assert_eq!(d.resource, "other.orders");
    }

    #[test]
    fn wildcard_action_and_resource() {
        let e = engine("ROLE Root { permissions: [ { actions: [*], resources: [*] } ] }");
        assert!(e.check_access("x", "deploy", "anything/at/all", &Context::new()).allowed);
    }

    #[test]
    fn action_matching_ignores_request_case() {
        let e = engine("ROLE Ops { can: [READ] resources: [Reports] }");
        assert!(e.check_access("x", "Read", "Reports", &Context::new()).allowed);
    }

    #[test]
    fn unevaluable_condition_does_not_match() {
        let e = engine(
            "ROLE Fin { permissions: [ { actions: [read], resources: [Ledger], \
             conditions: user.department == \"Finance\" } ] }",
        );
        assert!(!e.check_access("a", "read", "Ledger", &Context::new()).allowed);
        e.clear_cache();
        let finance = ctx(json!({"user": {"department": "Finance"}}));
        assert!(e.check_access("a", "read", "Ledger", &finance).allowed);
    }

    #[test]
    fn triple_cache_ignores_context_changes() {
        let e = engine(
            "ROLE Day { permissions: [ { actions: [read], resources: [Logs], \
             conditions: time.hour >= 9 AND time.hour < 17 } ] }",
        );
        let first = e.check_access("a", "read", "Logs", &ctx(json!({"time": {"hour": 10}})));
        let second = e.check_access("a", "read", "Logs", &ctx(json!({"time": {"hour": 23}})));
        assert!(first.allowed);
        assert_eq!(first, second);
        assert_eq!(e.cached_decisions(), 1);
    }

    #[test]
    fn context_cache_key_reevaluates() {
        let e = engine_with(
            "ROLE Day { permissions: [ { actions: [read], resources: [Logs], \
             conditions: time.hour >= 9 AND time.hour < 17 } ] }",
            EngineOptions {
                cache_key: CacheKeyMode::Context,
                ..EngineOptions::default()
            },
        );
        assert!(e.check_access("a", "read", "Logs", &ctx(json!({"time": {"hour": 10}}))).allowed);
        assert!(!e.check_access("a", "read", "Logs", &ctx(json!({"time": {"hour": 23}}))).allowed);
        assert_eq!(e.cached_decisions(), 2);
    }

    #[test]
    fn subject_scoping_limits_role_rules() {
        let src = "ROLE Reader { can: [read] resources: [Docs] }\n\
                   USER alice { role: [Reader] }\n\
                   USER bob {}\n\
                   ALLOW action: read ON resource: Public";
        let scoped = engine_with(
            src,
            EngineOptions {
                subject_scoping: true,
                ..EngineOptions::default()
            },
        );
        assert!(scoped.check_access("alice", "read", "Docs", &Context::new()).allowed);
        assert!(!scoped.check_access("bob", "read", "Docs", &Context::new()).allowed);
        assert!(scoped.check_access("bob", "read", "Public", &Context::new()).allowed);

        let open = engine(src);
        assert!(open.check_access("bob", "read", "Docs", &Context::new()).allowed);
    }

    #[test]
    fn explain_reports_each_rule() {
        let e = engine(
            "ROLE Ops { can: [read] resources: [db.*] }\n\
             DENY action: read ON resource: db.secrets IF user.clearance < 5",
        );
        let request = AccessRequest::new("a", "read", "db.secrets");
        let explanation = e.explain(&request);
        assert_eq!(explanation.evaluated_rules, 2);
        assert!(!explanation.decision.allowed);
        assert_eq!(explanation.decision.reason, REASON_DENIED);
        let deny = &explanation.steps[1];
        assert!(deny.action_matched && deny.resource_matched && deny.matched);
        assert_eq!(deny.condition_passed, Some(true));
        assert_eq!(deny.condition_error.as_deref(), Some("unresolved name 'user.clearance'"));
        assert_eq!(e.cached_decisions(), 0);

        let cleared_ctx = ctx(json!({"user": {"clearance": 7}}));
        let cleared = e.explain(&request.clone().with_context(cleared_ctx));
        assert!(cleared.decision.allowed);
        assert_eq!(cleared.steps[1].condition_passed, Some(false));
        assert!(cleared.steps[1].condition_error.is_none());
    }

    #[test]
    fn unevaluable_deny_condition_still_denies() {
        let e = engine(
            "ROLE Ops { can: [read] resources: [db.*] }\n\
             DENY action: read ON resource: db.secrets IF user.clearance < 5",
        );
        let decision = e.check_access("intruder", "read", "db.secrets", &Context::new());
        assert!(!decision.allowed);
        assert_eq!(decision.reason, REASON_DENIED);
        assert_eq!(decision.matched_rules.len(), 2);

        // Type mismatch is unevaluable too.
        e.clear_cache();
        let text = ctx(json!({"user": {"clearance": "high"}}));
        assert!(!e.check_access("intruder", "read", "db.secrets", &text).allowed);

        assert!(e.check_access("intruder", "read", "db.orders", &Context::new()).allowed);
    }

    #[test]
    fn batch_keeps_order_across_threads() {
        let e = engine("ROLE Ops { can: [read] resources: [db.*] }");
        let requests: Vec<AccessRequest> = (0..100)
            .map(|i| {
                let resource = if i % 2 == 0 { format!("db.t{}", i) } else { format!("fs.t{}", i) };
                AccessRequest::new("a", "read", resource)
            })
            .collect();
        let decisions = e.batch_check_access(&requests);
        assert_eq!(decisions.len(), 100);
        for (i, d) in decisions.iter().enumerate() {
            assert_eq!(d.allowed, i % 2 == 0, "request {}", i);
            assert_eq!(d.resource, requests[i].resource);
        }
    }
}
