//! Supervisor: picks the worker that should answer a question

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info_span, warn, Instrument};

use crate::llm::prompt::SUPERVISOR_PROMPT;
use crate::llm::{LanguageModel, LlmError, PromptTemplate};
use crate::metrics::{LLM_CALL_DURATION, ROUTER_DECISIONS};

/// Terminal routing target
pub const END: &str = "end";

/// Where a question goes next
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteDecision {
    Worker(String),
    End,
}

impl RouteDecision {
    /// Worker name, or [`END`].
    pub fn target(&self) -> &str {
        match self {
            RouteDecision::Worker(name) => name,
            RouteDecision::End => END,
        }
    }
}

pub struct Supervisor {
    model: Arc<dyn LanguageModel>,
    prompt: PromptTemplate,
}

impl Supervisor {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self::with_prompt(model, PromptTemplate::new(SUPERVISOR_PROMPT))
    }

    /// The prompt receives `{workers}` and `{question}`.
    pub fn with_prompt(model: Arc<dyn LanguageModel>, prompt: PromptTemplate) -> Self {
        Self { model, prompt }
    }

    /// Ask the model which of `members` should handle `question`.
    ///
    /// Anything other than a known member name is treated as [`RouteDecision::End`].
    pub async fn decide(&self, question: &str, members: &[String]) -> Result<RouteDecision, LlmError> {
        let workers = members.join(", ");
        let prompt = self
            .prompt
            .render(&[("workers", workers.as_str()), ("question", question)]);

        let start = Instant::now();
        let span = info_span!("llm_call", model = %self.model.name(), stage = "supervisor");
        let raw = self.model.infer(&prompt).instrument(span).await;
        LLM_CALL_DURATION
            .with_label_values(&[self.model.name(), "supervisor"])
            .observe(start.elapsed().as_secs_f64());
        let raw = raw?;
        debug!(raw = %raw, "Supervisor output");

        let decision = parse_decision(&raw, members);
        ROUTER_DECISIONS.with_label_values(&[decision.target()]).inc();
        Ok(decision)
    }
}

/// Interpret supervisor output of the form `{"next": "<worker|end>"}`.
pub fn parse_decision(raw: &str, members: &[String]) -> RouteDecision {
    let Some(next) = extract_next(raw) else {
        warn!(raw = %raw, "Supervisor output has no \"next\" key, ending");
        return RouteDecision::End;
    };

    if next.eq_ignore_ascii_case(END) {
        return RouteDecision::End;
    }

    match members.iter().find(|m| m.eq_ignore_ascii_case(&next)) {
        Some(member) => RouteDecision::Worker(member.clone()),
        None => {
            warn!(next = %next, ?members, "Supervisor chose an unknown worker, ending");
            RouteDecision::End
        }
    }
}

fn extract_next(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let value = serde_json::from_str::<Value>(trimmed).ok().or_else(|| {
        let start = trimmed.find('{')?;
        let end = trimmed.rfind('}')?;
        (start < end)
            .then(|| serde_json::from_str::<Value>(&trimmed[start..=end]).ok())
            .flatten()
    })?;

    value
        .get("next")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
}
