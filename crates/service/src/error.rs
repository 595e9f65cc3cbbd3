/// Errors returned by an [`LlmClient`](crate::advisor::LlmClient).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    /// Network or HTTP error.
    #[error("LLM network error: {0}")]
    Network(String),
    /// The LLM API returned an error response.
    #[error("LLM API error ({status}): {message}")]
    Api { status: u16, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdvisorError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("advisor unavailable: {0}")]
    Unavailable(String),
}

/// All errors that can be returned by a [`PolicyStore`](crate::store::PolicyStore).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("policy not found: {0}")]
    NotFound(String),
    #[error("policy already exists: {0}")]
    AlreadyExists(String),
    /// A backend-specific storage error (connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("Policy not found")]
    PolicyNotFound(String),
    #[error("batch of {got} requests exceeds the limit of {limit}")]
    BatchTooLarge { got: usize, limit: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
}
