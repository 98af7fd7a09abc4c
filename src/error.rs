//! Error taxonomy shared by the control plane and the agent

use thiserror::Error;

/// Result alias for fleet operations
pub type FleetResult<T> = Result<T, FleetError>;

/// Errors returned synchronously by registry, evaluator and agent operations.
///
/// None of these are retried automatically.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FleetError {
    /// Unknown component, deployment, host, rule, event or target id
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// Operation not valid for the current state machine state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Malformed operator, missing required field and the like
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A command or notification could not be enqueued or delivered
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// An agent reported (or produced) a failed command execution
    #[error("execution failed: {0}")]
    ExecutionFailure(String),
}

impl FleetError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        FleetError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl From<std::io::Error> for FleetError {
    fn from(err: std::io::Error) -> Self {
        FleetError::ExecutionFailure(err.to_string())
    }
}

impl From<reqwest::Error> for FleetError {
    fn from(err: reqwest::Error) -> Self {
        FleetError::TransportFailure(err.to_string())
    }
}
