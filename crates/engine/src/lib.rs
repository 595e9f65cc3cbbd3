//! RPL policy enforcement engine -- answers access-control queries against a
//! compiled symbol table.
//!
//! Rules are scanned in declaration order; any matching DENY wins over any
//! matching ALLOW, and no match means deny. Decisions are memoized per
//! engine instance.

pub mod cache;
pub mod condition;
pub mod decision;
pub mod engine;
pub mod simulate;

pub use cache::{CacheKeyMode, DecisionCache};
pub use condition::{evaluate_condition, ConditionError, Context};
pub use decision::{AccessRequest, Decision, EvaluationStep, Explanation};
pub use engine::{EngineOptions, PolicyEngine};
pub use simulate::{user_permissions, UserPermissions};
