//! Orchestration around the RPL compiler and engine: advisory security
//! analysis, policy storage, and enforcement by policy id.
//!
//! The compiler and engine are synchronous and CPU-bound. Everything here
//! that touches an external collaborator (LLM, store) is async.

pub mod advisor;
pub mod compiler;
pub mod enforcement;
pub mod error;
pub mod store;

pub use advisor::{LlmAdvisor, LlmClient, Message, SecurityAdvisor};
pub use compiler::CompilerService;
pub use enforcement::{
    DecisionExplanation, EnforcementRecord, EnforcementService, EnforcementStats, HistoryQuery,
    DEFAULT_LOG_CAPACITY, MAX_BATCH_REQUESTS,
};
pub use error::{AdvisorError, LlmError, ServiceError, StoreError};
pub use store::{InMemoryPolicyStore, PolicyStore, StoredPolicy};
