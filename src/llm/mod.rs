//! Language model integration
//!
//! Every model call in the crate goes through the [`LanguageModel`] trait:
//! a prompt goes in, text comes out. Concrete backends live in submodules:
//!
//! - `ollama` - Ollama's `/api/generate` endpoint (optionally in JSON mode)
//! - `openai` - OpenAI-compatible `/chat/completions` (Groq, vLLM, ...)
//! - `prompt` - `{variable}` templates and the default prompts
//!
//! Transient provider failures (connect errors, timeouts, 429 and 5xx) are
//! retried a small fixed number of times inside the client. Nothing above this
//! layer retries model calls.

pub mod ollama;
pub mod openai;
pub mod prompt;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

pub use ollama::{GenerateResponse, OllamaClient, OllamaModel};
pub use openai::{ChatMessage, OpenAiClient, OpenAiModel};
pub use prompt::PromptTemplate;

/// A text-in, text-out model capability.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier, used for logging and metric labels.
    fn name(&self) -> &str;

    /// Run one inference with the fully rendered prompt.
    async fn infer(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Error type for model provider calls
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("empty response from model provider")]
    EmptyResponse,

    #[error("API key not found in environment variable {0}")]
    MissingApiKey(String),
}

impl LlmError {
    /// Whether another attempt might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Request(e) => e.is_timeout() || e.is_connect(),
            LlmError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Retry settings for a model provider client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one fails
    pub max_retries: u32,
    /// Delay between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds, fails permanently, or retries run out.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(what, attempt, error = %e, "Transient model provider failure, retrying");
                    tokio::time::sleep(self.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
