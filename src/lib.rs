//! vmchain - LLM-driven API calling for virtualization management APIs
//!
//! Given a natural-language question and documentation of an HTTP API, a
//! language model picks the endpoint, method and body, the call is checked
//! against a per-node domain allow-list and executed, and a second model call
//! turns the raw response into an answer. A supervisor model routes questions
//! across several nodes.
//!
//! # Modules
//!
//! - `chain` - the question → request → response → answer pipeline
//! - `router` - supervisor routing across per-node chains
//! - `llm` - language model trait, Ollama and OpenAI-compatible clients, prompts
//! - `docs` - loading JSON endpoint documentation
//! - `config` - YAML application configuration
//! - `app` - building the team of chains from configuration
//! - `server` - axum HTTP front-end with rate limiting
//! - `metrics` - Prometheus metrics
//! - `tracing` - logging and OpenTelemetry export
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use vmchain::{ApiChain, ChainConfig, OllamaClient};
//!
//! let config = ChainConfig::builder()
//!     .name("node1")
//!     .api_docs(docs)
//!     .base_url("https://pve1.lab:8006")
//!     .limit_to_domains(["https://pve1.lab:8006"])
//!     .token("PVEAPIToken=root@pam!vmchain=...")
//!     .build()?;
//!
//! let model = Arc::new(OllamaClient::new("http://localhost:11434").model("llama3.1"));
//! let chain = ApiChain::with_http(config, model)?;
//! let answer = chain.invoke("list VMs on node n1").await?;
//! ```

pub mod app;
pub mod chain;
pub mod config;
pub mod docs;
pub mod llm;
pub mod metrics;
pub mod router;
pub mod server;
pub mod tracing;

// Re-export commonly used types at crate root for convenience
pub use chain::{ApiChain, ChainConfig, ChainError, ChainOutput, HttpMethod, WireFormat};
pub use config::AppConfig;
pub use llm::{LanguageModel, OllamaClient, OpenAiClient};
pub use router::{RouteOutcome, Supervisor, Team};
