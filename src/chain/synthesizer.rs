//! Request and response synthesizers
//!
//! Both are one model call each: render a prompt, infer, post-process.
//! Neither retries; provider-level retries live in the model clients.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info_span, warn, Instrument};

use super::error::ChainError;
use super::request::{ApiRequest, WireFormat};
use crate::llm::{LanguageModel, LlmError, PromptTemplate};
use crate::metrics::LLM_CALL_DURATION;

async fn timed_infer(
    model: &dyn LanguageModel,
    stage: &'static str,
    prompt: &str,
) -> Result<String, LlmError> {
    let start = Instant::now();
    let span = info_span!("llm_call", model = %model.name(), stage);
    let result = model.infer(prompt).instrument(span).await;
    LLM_CALL_DURATION
        .with_label_values(&[model.name(), stage])
        .observe(start.elapsed().as_secs_f64());
    result
}

/// Turns `(question, context)` into an [`ApiRequest`]
#[derive(Clone)]
pub struct RequestSynthesizer {
    model: Arc<dyn LanguageModel>,
    prompt: PromptTemplate,
    format: WireFormat,
}

impl RequestSynthesizer {
    pub fn new(model: Arc<dyn LanguageModel>, prompt: PromptTemplate, format: WireFormat) -> Self {
        Self { model, prompt, format }
    }

    pub async fn synthesize(&self, question: &str, context: &str) -> Result<ApiRequest, ChainError> {
        let prompt = self
            .prompt
            .render(&[("question", question), ("api_docs", context)]);
        let raw = timed_infer(self.model.as_ref(), "request", &prompt).await?;
        debug!(raw = %raw, "Request synthesizer output");

        ApiRequest::parse(&raw, self.format).map_err(|e| {
            warn!(error = %e.message, raw = %e.raw, "Could not parse synthesized request");
            ChainError::from(e)
        })
    }
}

/// Turns the executed call and its response into the final answer
#[derive(Clone)]
pub struct ResponseSynthesizer {
    model: Arc<dyn LanguageModel>,
    prompt: PromptTemplate,
}

impl ResponseSynthesizer {
    pub fn new(model: Arc<dyn LanguageModel>, prompt: PromptTemplate) -> Self {
        Self { model, prompt }
    }

    pub async fn summarize(
        &self,
        question: &str,
        context: &str,
        api_url: &str,
        api_response: &str,
    ) -> Result<String, ChainError> {
        let prompt = self.prompt.render(&[
            ("question", question),
            ("api_docs", context),
            ("api_url", api_url),
            ("api_response", api_response),
        ]);
        let answer = timed_infer(self.model.as_ref(), "response", &prompt).await?;
        Ok(answer.trim().to_string())
    }
}
