// src/infra/errors.rs — Error types for the layout copilot

use thiserror::Error;

use crate::retrieval::RetrievalError;

#[derive(Error, Debug)]
pub enum CopilotError {
    // Remote errors (retriable)
    #[error("Provider '{provider}' error: {message}")]
    Provider {
        provider: String,
        message: String,
        retriable: bool,
    },

    #[error("Rate limited by '{provider}', retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("{stage} call timed out after {after_ms}ms")]
    Timeout { stage: String, after_ms: u64 },

    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    // Caller input errors
    #[error("Unsupported city: {city}")]
    UnsupportedCity { city: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Loop outcomes surfaced as errors
    #[error("No compliant plan found within {iterations} iterations")]
    BudgetExceeded { iterations: u32 },

    #[error("Layout loop exceeded its wall-clock budget after {elapsed_ms}ms")]
    LoopTimeout { elapsed_ms: u64 },

    // Infra
    #[error("Render error: {0}")]
    Render(String),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification used by callers to pick a user-facing response.
/// Malformed model output never surfaces here: the generator absorbs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TransientRemote,
    UnsupportedInput,
    BudgetExceeded,
    Timeout,
    Internal,
}

impl CopilotError {
    pub fn is_retriable(&self) -> bool {
        match self {
            CopilotError::Provider { retriable, .. } => *retriable,
            CopilotError::RateLimited { .. } => true,
            CopilotError::Retrieval(e) => e.is_transient(),
            _ => false,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CopilotError::Provider { .. }
            | CopilotError::RateLimited { .. }
            | CopilotError::Retrieval(_) => ErrorKind::TransientRemote,
            CopilotError::Timeout { .. } | CopilotError::LoopTimeout { .. } => ErrorKind::Timeout,
            CopilotError::UnsupportedCity { .. } | CopilotError::InvalidRequest(_) => {
                ErrorKind::UnsupportedInput
            }
            CopilotError::BudgetExceeded { .. } => ErrorKind::BudgetExceeded,
            _ => ErrorKind::Internal,
        }
    }
}
