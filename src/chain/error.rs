//! Error types for a single chain invocation

use thiserror::Error;

use super::context::RetrievalError;
use super::executor::TransportError;
use super::request::SUPPORTED_HTTP_METHODS;
use crate::llm::LlmError;

/// The model's output could not be decomposed into `{url, method, body}`.
///
/// Carries the raw text so the failure can be diagnosed.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct OutputParseError {
    pub message: String,
    pub raw: String,
}

impl OutputParseError {
    pub fn new(message: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            raw: raw.into(),
        }
    }
}

/// Error type for chain operations
#[derive(Debug, Error)]
pub enum ChainError {
    /// Recoverable: surfaced to the caller as `{output: "", error}`
    #[error("Output parse error: {0}")]
    OutputParse(#[from] OutputParseError),

    #[error("{url} is not in the allowed domains: {allowed:?}")]
    DomainViolation { url: String, allowed: Vec<String> },

    #[error("Expected one of {:?}, got {method}", SUPPORTED_HTTP_METHODS)]
    UnsupportedMethod { method: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Language model error: {0}")]
    Llm(#[from] LlmError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Failed to start blocking runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl ChainError {
    /// Stable label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            ChainError::OutputParse(_) => "parse_error",
            ChainError::DomainViolation { .. } => "domain_violation",
            ChainError::UnsupportedMethod { .. } => "unsupported_method",
            ChainError::Transport(_) => "transport_error",
            ChainError::Llm(_) => "llm_error",
            ChainError::Retrieval(_) => "retrieval_error",
            ChainError::Runtime(_) => "runtime_error",
        }
    }

    /// Everything except an output parse failure aborts the call.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ChainError::OutputParse(_))
    }
}
