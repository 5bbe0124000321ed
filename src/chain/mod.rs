//! Question → API call → answer
//!
//! An [`ApiChain`] answers a natural-language question about one backend
//! target:
//!
//! 1. the request synthesizer asks a model for `{api_url, request_method,
//!    request_body}` given the question and the API documentation
//! 2. the domain guard checks the resolved URL against the allow-list
//! 3. the executor performs the call
//! 4. the response synthesizer turns the raw response into an answer
//!
//! Submodules:
//! - `config` - [`ChainConfig`] and its validating builder
//! - `context` - API docs or retriever, top-K assembly
//! - `domain` - allow-list matching
//! - `error` - [`ChainError`] taxonomy
//! - `executor` - [`RequestExecutor`] and the reqwest implementation
//! - `pipeline` - the [`ApiChain`] state machine
//! - `request` - [`HttpMethod`], [`ApiRequest`] parsing
//! - `synthesizer` - the two model-backed stages

pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod request;
pub mod synthesizer;

pub use config::{ChainConfig, ChainConfigBuilder, ConfigError};
pub use context::{ContextSource, KeywordRetriever, RetrievalError, Retriever, ScoredDocument};
pub use error::{ChainError, OutputParseError};
pub use executor::{
    ApiResponse, Headers, HttpExecutor, RequestExecutor, ResponseContent, TransportError,
    UpstreamHttpError,
};
pub use pipeline::{ApiChain, ChainOutput, ChainStage};
pub use request::{ApiRequest, HttpMethod, WireFormat};
