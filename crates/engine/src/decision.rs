use crate::condition::Context;
use rpl_core::ast::RuleType;
use rpl_core::PolicyRule;
use serde::{Deserialize, Serialize};

pub const REASON_DENIED: &str = "Access denied by explicit DENY rule";
pub const REASON_ALLOWED: &str = "Access allowed by ALLOW rule";
pub const REASON_DEFAULT_DENY: &str = "No matching rules, default deny";

/// One query against the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub subject: String,
    pub action: String,
    pub resource: String,
    #[serde(default)]
    pub context: Context,
}

impl AccessRequest {
    pub fn new(
        subject: impl Into<String>,
        action: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        AccessRequest {
            subject: subject.into(),
            action: action.into(),
            resource: resource.into(),
            context: Context::new(),
        }
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    pub matched_rules: Vec<PolicyRule>,
    pub reason: String,
    pub subject: String,
    pub action: String,
    pub resource: String,
}

impl Decision {
    /// Deny overrides allow; no matching rule means deny.
    pub fn resolve(request: &AccessRequest, matched_rules: Vec<PolicyRule>) -> Self {
        let (allowed, reason) = if matched_rules.iter().any(|r| r.rule_type == RuleType::Deny) {
            (false, REASON_DENIED)
        } else if matched_rules.iter().any(|r| r.rule_type == RuleType::Allow) {
            (true, REASON_ALLOWED)
        } else {
            (false, REASON_DEFAULT_DENY)
        };
        Decision {
            allowed,
            matched_rules,
            reason: reason.to_owned(),
            subject: request.subject.clone(),
            action: request.action.clone(),
            resource: request.resource.clone(),
        }
    }

    /// Fail-closed decision with a caller-supplied reason.
    pub fn denied(request: &AccessRequest, reason: impl Into<String>) -> Self {
        Decision {
            allowed: false,
            matched_rules: Vec::new(),
            reason: reason.into(),
            subject: request.subject.clone(),
            action: request.action.clone(),
            resource: request.resource.clone(),
        }
    }
}

/// How one rule fared against a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationStep {
    pub line: u32,
    pub rule_type: RuleType,
    pub resource_pattern: String,
    pub action_matched: bool,
    pub resource_matched: bool,
    /// `None` when the rule has no condition or was rejected before it.
    pub condition_passed: Option<bool>,
    /// Why the condition could not be evaluated, if it could not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_error: Option<String>,
    pub matched: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub decision: Decision,
    pub evaluated_rules: usize,
    pub steps: Vec<EvaluationStep>,
}
