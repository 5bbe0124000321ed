//! The API chain
//!
//! One invocation walks a fixed sequence of stages:
//!
//! ```text
//! Start → Synthesizing → DomainCheck → Executing → Summarizing → Done
//!              │              │            │
//!              └──────────────┴────────────┴──→ Error
//! ```
//!
//! There is a single async pipeline. [`ApiChain::invoke_blocking`] drives the
//! same future on a private current-thread runtime, so both call modes run the
//! same checks in the same order. The pipeline awaits only at the two model
//! calls and the API request; parsing, cleanup and the domain check are
//! synchronous.
//!
//! A parse failure of the synthesized request is returned as
//! `{output: "", error}`. Every other failure is returned as `Err`.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::config::ChainConfig;
use super::domain;
use super::error::ChainError;
use super::executor::{HttpExecutor, RequestExecutor, TransportError};
use super::request::join_url;
use super::synthesizer::{RequestSynthesizer, ResponseSynthesizer};
use crate::llm::LanguageModel;
use crate::metrics::{API_REQUESTS, CHAIN_DURATION, CHAIN_RUNS, DOMAIN_VIOLATIONS};

/// Stages of one chain invocation, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStage {
    Start,
    Synthesizing,
    DomainCheck,
    Executing,
    Summarizing,
    Done,
    Error,
}

/// Result of one invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainOutput {
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stages visited, for diagnostics
    #[serde(skip)]
    pub stages: Vec<ChainStage>,
}

impl ChainOutput {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Stage tracker for a single invocation. Stages only move forward.
#[derive(Debug)]
struct ChainRun {
    stages: Vec<ChainStage>,
}

impl ChainRun {
    fn new() -> Self {
        Self {
            stages: vec![ChainStage::Start],
        }
    }

    fn current(&self) -> ChainStage {
        self.stages.last().copied().unwrap_or(ChainStage::Start)
    }

    fn enter(&mut self, stage: ChainStage) {
        debug_assert!(stage > self.current(), "chain stage went from {:?} to {:?}", self.current(), stage);
        debug!(from = ?self.current(), to = ?stage, "Chain stage");
        self.stages.push(stage);
    }
}

/// Question-answering chain for one backend target
pub struct ApiChain {
    config: ChainConfig,
    request: RequestSynthesizer,
    response: ResponseSynthesizer,
    executor: Arc<dyn RequestExecutor>,
}

impl ApiChain {
    /// Build a chain that uses `model` for both synthesizers.
    pub fn new(
        config: ChainConfig,
        model: Arc<dyn LanguageModel>,
        executor: Arc<dyn RequestExecutor>,
    ) -> Self {
        let request = RequestSynthesizer::new(
            model.clone(),
            config.request_prompt().clone(),
            config.wire_format(),
        );
        let response = ResponseSynthesizer::new(model, config.response_prompt().clone());
        Self {
            config,
            request,
            response,
            executor,
        }
    }

    /// Build a chain backed by a real [`HttpExecutor`].
    pub fn with_http(config: ChainConfig, model: Arc<dyn LanguageModel>) -> Result<Self, TransportError> {
        let executor = HttpExecutor::new(config.insecure_tls())?;
        Ok(Self::new(config, model, Arc::new(executor)))
    }

    pub fn name(&self) -> &str {
        self.config.name()
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// The URL that will actually be requested for a synthesized `api_url`.
    ///
    /// Base-scoped chains always treat the synthesized URL as relative.
    pub fn resolve_url(&self, api_url: &str) -> String {
        match self.config.base_url() {
            Some(base) => join_url(base, api_url),
            None => api_url.to_string(),
        }
    }

    /// Answer `question`.
    pub async fn invoke(&self, question: &str) -> Result<ChainOutput, ChainError> {
        let run_id = Uuid::now_v7();
        let node = self.config.name();
        let span = info_span!("api_chain", %run_id, node = %node);

        let start = Instant::now();
        let mut run = ChainRun::new();
        let result = self.run(question, &mut run).instrument(span).await;
        CHAIN_DURATION
            .with_label_values(&[node])
            .observe(start.elapsed().as_secs_f64());

        match result {
            Ok(output) => {
                run.enter(ChainStage::Done);
                CHAIN_RUNS.with_label_values(&[node, "ok"]).inc();
                info!(%run_id, node, elapsed_ms = start.elapsed().as_millis() as u64, "Chain finished");
                Ok(ChainOutput {
                    output,
                    error: None,
                    stages: run.stages,
                })
            }
            Err(e) => {
                run.enter(ChainStage::Error);
                CHAIN_RUNS.with_label_values(&[node, e.kind()]).inc();
                if e.is_fatal() {
                    warn!(%run_id, node, error = %e, stage = ?run.stages[run.stages.len() - 2], "Chain failed");
                    return Err(e);
                }
                Ok(ChainOutput {
                    output: String::new(),
                    error: Some(e.to_string()),
                    stages: run.stages,
                })
            }
        }
    }

    /// Answer `question`, blocking the calling thread.
    ///
    /// Runs [`invoke`](Self::invoke) on a private current-thread runtime.
    /// Called from inside an async context it returns [`ChainError::Runtime`]
    /// instead of blocking a runtime thread.
    pub fn invoke_blocking(&self, question: &str) -> Result<ChainOutput, ChainError> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(ChainError::Runtime(std::io::Error::new(
                std::io::ErrorKind::Other,
                "invoke_blocking called from inside an async runtime",
            )));
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.invoke(question))
    }

    async fn run(&self, question: &str, run: &mut ChainRun) -> Result<String, ChainError> {
        let node = self.config.name();

        run.enter(ChainStage::Synthesizing);
        // Resolved once and shared by both synthesizers
        let context = self.config.context().resolve(question, self.config.top_k())?;
        let request = self.request.synthesize(question, &context).await?;

        run.enter(ChainStage::DomainCheck);
        let api_url = self.resolve_url(&request.api_url);
        debug!(api_url = %api_url, method = %request.request_method, "Resolved API call");
        if !domain::is_allowed(&api_url, self.config.allowed_domains()) {
            DOMAIN_VIOLATIONS.with_label_values(&[node]).inc();
            return Err(ChainError::DomainViolation {
                url: api_url,
                allowed: self.config.allowed_domains().unwrap_or_default().to_vec(),
            });
        }

        run.enter(ChainStage::Executing);
        let method = request.method()?;
        let api_response = if !self.config.allowed_methods().contains(&method) {
            warn!(method = %method, "Request method not allowed for this chain, skipping call");
            format!("Request method {method} is not allowed.")
        } else {
            let body = method.carries_body().then_some(&request.request_body);
            let span = info_span!("api_request", method = %method, url = %api_url);
            let response = self
                .executor
                .send(method, &api_url, self.config.headers(), body)
                .instrument(span)
                .await
                .map_err(|e| {
                    API_REQUESTS
                        .with_label_values(&[node, method.as_str(), "transport_error"])
                        .inc();
                    e
                })?;

            let status = response.status.to_string();
            API_REQUESTS
                .with_label_values(&[node, method.as_str(), status.as_str()])
                .inc();
            if let Some(upstream) = response.upstream_error() {
                warn!(status = upstream.status, reason = %upstream.reason, "API responded with an error");
            }
            response.render(self.config.response_content())
        };
        debug!(api_response = %api_response, "API response");

        run.enter(ChainStage::Summarizing);
        self.response
            .summarize(question, &context, &api_url, &api_response)
            .await
    }
}
