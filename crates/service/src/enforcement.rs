//! Enforcement by policy id.
//!
//! One engine is built per stored policy on first use and kept until
//! [`EnforcementService::invalidate`] drops it. An unknown policy id is a
//! deny with reason "Policy not found", never an error. The enforcement log
//! keeps the most recent [`DEFAULT_LOG_CAPACITY`] checks unless configured
//! otherwise.

use crate::error::ServiceError;
use crate::store::PolicyStore;
use rpl_core::ast::RuleType;
use rpl_engine::{AccessRequest, Decision, EngineOptions, EvaluationStep, PolicyEngine};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Largest batch the request-facing layer should accept in one call.
pub const MAX_BATCH_REQUESTS: usize = 100;

/// Records kept in the enforcement log before the oldest are dropped.
pub const DEFAULT_LOG_CAPACITY: usize = 10_000;

pub const REASON_POLICY_NOT_FOUND: &str = "Policy not found";

/// One logged access check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnforcementRecord {
    pub policy_id: String,
    pub subject: String,
    pub action: String,
    pub resource: String,
    pub allowed: bool,
    pub reason: String,
    pub matched_rules: usize,
    pub checked_at: OffsetDateTime,
}

/// Filter for [`EnforcementService::history`].
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub policy_id: Option<String>,
    pub subject: Option<String>,
    pub resource: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnforcementStats {
    pub total_checks: usize,
    pub allowed_count: usize,
    pub denied_count: usize,
    /// Fraction of allowed checks, 0.0 without checks.
    pub allow_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionExplanation {
    pub decision: Decision,
    pub evaluated_rules: usize,
    pub steps: Vec<EvaluationStep>,
    pub reasoning: Vec<String>,
    pub suggestions: Vec<String>,
}

pub struct EnforcementService {
    store: Arc<dyn PolicyStore>,
    options: EngineOptions,
    engines: RwLock<HashMap<String, Arc<PolicyEngine>>>,
    log: Mutex<VecDeque<EnforcementRecord>>,
    log_capacity: usize,
}

impl EnforcementService {
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        EnforcementService::with_options(store, EngineOptions::default())
    }

    pub fn with_options(store: Arc<dyn PolicyStore>, options: EngineOptions) -> Self {
        EnforcementService {
            store,
            options,
            engines: RwLock::new(HashMap::new()),
            log: Mutex::new(VecDeque::new()),
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }

    /// Bound the enforcement log to `capacity` records (at least one).
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity.max(1);
        self
    }

    /// Reject batches over [`MAX_BATCH_REQUESTS`]; for the request-facing layer.
    pub fn check_batch_size(requests: usize) -> Result<(), ServiceError> {
        if requests > MAX_BATCH_REQUESTS {
            return Err(ServiceError::BatchTooLarge {
                got: requests,
                limit: MAX_BATCH_REQUESTS,
            });
        }
        Ok(())
    }

    /// Engine for `policy_id`, built from the store on first use.
    async fn engine(&self, policy_id: &str) -> Result<Arc<PolicyEngine>, ServiceError> {
        if let Some(engine) = self.engines.read().await.get(policy_id) {
            return Ok(engine.clone());
        }
        let stored = self
            .store
            .get(policy_id)
            .await?
            .ok_or_else(|| ServiceError::PolicyNotFound(policy_id.to_string()))?;

        let mut engines = self.engines.write().await;
        let engine = engines
            .entry(policy_id.to_string())
            .or_insert_with(|| {
                Arc::new(PolicyEngine::with_options(
                    stored.symbol_table,
                    self.options,
                ))
            })
            .clone();
        debug!(event = "Enforce", phase = "EngineLoaded", policy_id);
        Ok(engine)
    }

    fn fail_closed(policy_id: &str, request: &AccessRequest, error: &ServiceError) -> Decision {
        match error {
            ServiceError::PolicyNotFound(_) => {
                warn!(event = "Enforce", phase = "PolicyNotFound", policy_id);
                Decision::denied(request, REASON_POLICY_NOT_FOUND)
            }
            other => {
                warn!(event = "Enforce", phase = "Failed", policy_id, error = %other);
                Decision::denied(request, format!("Policy unavailable: {}", other))
            }
        }
    }

    /// Decide one request. `simulate` skips the enforcement log.
    pub async fn check(&self, policy_id: &str, request: &AccessRequest, simulate: bool) -> Decision {
        let decision = match self.engine(policy_id).await {
            Ok(engine) => engine.check(request),
            Err(e) => return Self::fail_closed(policy_id, request, &e),
        };
        if !simulate {
            self.record(policy_id, &decision).await;
        }
        decision
    }

    /// Decide each request independently, preserving order. Evaluation runs
    /// on the blocking pool.
    pub async fn batch_check(&self, policy_id: &str, requests: Vec<AccessRequest>) -> Vec<Decision> {
        let engine = match self.engine(policy_id).await {
            Ok(engine) => engine,
            Err(e) => {
                return requests
                    .iter()
                    .map(|r| Self::fail_closed(policy_id, r, &e))
                    .collect()
            }
        };
        let fallback: Vec<Decision> = requests
            .iter()
            .map(|r| Decision::denied(r, "Evaluation failed"))
            .collect();
        let decisions =
            match tokio::task::spawn_blocking(move || engine.batch_check_access(&requests)).await {
                Ok(decisions) => decisions,
                Err(e) => {
                    warn!(event = "Enforce", phase = "BatchAborted", policy_id, error = %e);
                    fallback
                }
            };
        for decision in &decisions {
            self.record(policy_id, decision).await;
        }
        info!(event = "Enforce", phase = "Batch", policy_id, count = decisions.len());
        decisions
    }

    /// Evaluate without cache or log and describe how the decision came about.
    pub async fn explain(
        &self,
        policy_id: &str,
        request: &AccessRequest,
    ) -> Result<DecisionExplanation, ServiceError> {
        let engine = self.engine(policy_id).await?;
        let explanation = engine.explain(request);

        let mut reasoning = Vec::new();
        for step in explanation.steps.iter().filter(|s| s.matched) {
            reasoning.push(format!(
                "{} rule at line {} matches '{}' on '{}'",
                step.rule_type, step.line, request.action, step.resource_pattern
            ));
        }
        for step in &explanation.steps {
            if let Some(error) = &step.condition_error {
                let treated_as = if step.rule_type == RuleType::Deny {
                    "denies"
                } else {
                    "does not grant"
                };
                reasoning.push(format!(
                    "Condition of rule at line {} could not be evaluated ({}); the rule {}",
                    step.line, error, treated_as
                ));
            } else if step.condition_passed == Some(false) {
                reasoning.push(format!("Condition of rule at line {} is not satisfied", step.line));
            }
        }
        reasoning.push(explanation.decision.reason.clone());

        let mut suggestions = Vec::new();
        if !explanation.decision.allowed {
            let denied_explicitly = explanation
                .decision
                .matched_rules
                .iter()
                .any(|r| r.rule_type == RuleType::Deny);
            if !denied_explicitly {
                suggestions.push("Request role upgrade".to_string());
            }
            suggestions.push("Use different action".to_string());
        }

        Ok(DecisionExplanation {
            decision: explanation.decision,
            evaluated_rules: explanation.evaluated_rules,
            steps: explanation.steps,
            reasoning,
            suggestions,
        })
    }

    /// Drop the cached engine for `policy_id`; the next check rebuilds it
    /// from the store. Returns whether an engine was cached.
    pub async fn invalidate(&self, policy_id: &str) -> bool {
        let removed = self.engines.write().await.remove(policy_id).is_some();
        info!(event = "Enforce", phase = "Invalidated", policy_id, removed);
        removed
    }

    async fn record(&self, policy_id: &str, decision: &Decision) {
        let mut log = self.log.lock().await;
        while log.len() >= self.log_capacity {
            log.pop_front();
        }
        log.push_back(EnforcementRecord {
            policy_id: policy_id.to_string(),
            subject: decision.subject.clone(),
            action: decision.action.clone(),
            resource: decision.resource.clone(),
            allowed: decision.allowed,
            reason: decision.reason.clone(),
            matched_rules: decision.matched_rules.len(),
            checked_at: OffsetDateTime::now_utc(),
        });
    }

    /// Logged checks, most recent first.
    pub async fn history(&self, query: &HistoryQuery) -> Vec<EnforcementRecord> {
        let log = self.log.lock().await;
        log.iter()
            .rev()
            .filter(|r| query.policy_id.as_ref().map_or(true, |p| &r.policy_id == p))
            .filter(|r| query.subject.as_ref().map_or(true, |s| &r.subject == s))
            .filter(|r| query.resource.as_ref().map_or(true, |res| &r.resource == res))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub async fn stats(&self, policy_id: Option<&str>) -> EnforcementStats {
        let log = self.log.lock().await;
        let (total, allowed) = log
            .iter()
            .filter(|r| policy_id.map_or(true, |p| r.policy_id == p))
            .fold((0usize, 0usize), |(t, a), r| (t + 1, a + usize::from(r.allowed)));
        EnforcementStats {
            total_checks: total,
            allowed_count: allowed,
            denied_count: total - allowed,
            allow_rate: if total == 0 {
                0.0
            } else {
                allowed as f64 / total as f64
            },
        }
    }
}
