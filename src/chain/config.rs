//! Chain configuration
//!
//! A [`ChainConfig`] is built once per backend target and never mutated. All
//! validation happens in [`ChainConfigBuilder::build`], in a fixed order:
//!
//! 1. context source: exactly one of API docs or a retriever
//! 2. domain policy: an allow-list (non-empty) or an explicit opt-out
//! 3. authorization header
//! 4. prompt variables
//!
//! followed by the base URL and method list checks. The first failing check
//! is reported.

use std::sync::Arc;

use thiserror::Error;
use url::Url;

use super::context::{ContextSource, Retriever};
use super::executor::{Headers, ResponseContent};
use super::request::{HttpMethod, WireFormat};
use crate::llm::prompt::{API_REQUEST_PROMPT_JSON, API_REQUEST_PROMPT_PIPE, API_RESPONSE_PROMPT};
use crate::llm::PromptTemplate;

/// Environment variable consulted when no token is given
pub const TOKEN_ENV: &str = "PVE_TOKEN";

pub const DEFAULT_TOP_K: usize = 3;

const REQUEST_PROMPT_VARIABLES: [&str; 2] = ["api_docs", "question"];
const RESPONSE_PROMPT_VARIABLES: [&str; 4] = ["api_docs", "api_response", "api_url", "question"];

/// Construction-time validation failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("either api_docs or a retriever must be provided")]
    MissingContextSource,

    #[error("only one of api_docs or a retriever may be provided")]
    ConflictingContextSources,

    #[error(
        "no domain policy: call limit_to_domains(..) with the permitted URLs, \
         or allow_all_domains() to disable the check (unsafe)"
    )]
    MissingDomainPolicy,

    #[error("limit_to_domains is empty; this would reject every request")]
    EmptyAllowList,

    #[error("no Authorization header: pass a token or set {}", TOKEN_ENV)]
    MissingAuthorization,

    #[error("{prompt} prompt must use exactly {expected:?}, found {found:?}")]
    PromptVariables {
        prompt: &'static str,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("invalid base_url {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("allowed_http_methods is empty")]
    NoAllowedMethods,
}

/// Immutable per-target chain configuration
#[derive(Debug, Clone)]
pub struct ChainConfig {
    name: String,
    context: ContextSource,
    allowed_domains: Option<Vec<String>>,
    base_url: Option<String>,
    headers: Headers,
    allowed_methods: Vec<HttpMethod>,
    wire_format: WireFormat,
    response_content: ResponseContent,
    top_k: usize,
    request_prompt: PromptTemplate,
    response_prompt: PromptTemplate,
    insecure_tls: bool,
}

impl ChainConfig {
    pub fn builder() -> ChainConfigBuilder {
        ChainConfigBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &ContextSource {
        &self.context
    }

    /// `None` means every domain is permitted.
    pub fn allowed_domains(&self) -> Option<&[String]> {
        self.allowed_domains.as_deref()
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn allowed_methods(&self) -> &[HttpMethod] {
        &self.allowed_methods
    }

    pub fn wire_format(&self) -> WireFormat {
        self.wire_format
    }

    pub fn response_content(&self) -> ResponseContent {
        self.response_content
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn request_prompt(&self) -> &PromptTemplate {
        &self.request_prompt
    }

    pub fn response_prompt(&self) -> &PromptTemplate {
        &self.response_prompt
    }

    pub fn insecure_tls(&self) -> bool {
        self.insecure_tls
    }
}

#[derive(Debug, Clone, Default)]
enum DomainPolicy {
    #[default]
    Unset,
    AllowAll,
    Limit(Vec<String>),
}

/// Builder for [`ChainConfig`]
#[derive(Default, Clone)]
pub struct ChainConfigBuilder {
    name: Option<String>,
    api_docs: Option<String>,
    retriever: Option<Arc<dyn Retriever>>,
    domains: DomainPolicy,
    base_url: Option<String>,
    headers: Headers,
    token: Option<String>,
    allowed_methods: Option<Vec<HttpMethod>>,
    wire_format: WireFormat,
    response_content: ResponseContent,
    top_k: Option<usize>,
    request_prompt: Option<String>,
    response_prompt: Option<String>,
    insecure_tls: bool,
}

impl ChainConfigBuilder {
    /// Name used in logs and metric labels. Defaults to "default".
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn api_docs(mut self, docs: impl Into<String>) -> Self {
        self.api_docs = Some(docs.into());
        self
    }

    pub fn retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Only URLs under these prefixes or hosts may be requested.
    pub fn limit_to_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domains = DomainPolicy::Limit(domains.into_iter().map(Into::into).collect());
        self
    }

    /// Disable the domain check. Any URL the model produces will be requested.
    pub fn allow_all_domains(mut self) -> Self {
        self.domains = DomainPolicy::AllowAll;
        self
    }

    /// Synthesized URLs are treated as relative to this base.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Authorization token, used verbatim as the header value.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn allowed_http_methods<I>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = HttpMethod>,
    {
        self.allowed_methods = Some(methods.into_iter().collect());
        self
    }

    pub fn wire_format(mut self, format: WireFormat) -> Self {
        self.wire_format = format;
        self
    }

    pub fn response_content(mut self, mode: ResponseContent) -> Self {
        self.response_content = mode;
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn request_prompt(mut self, template: impl Into<String>) -> Self {
        self.request_prompt = Some(template.into());
        self
    }

    pub fn response_prompt(mut self, template: impl Into<String>) -> Self {
        self.response_prompt = Some(template.into());
        self
    }

    pub fn insecure_tls(mut self, insecure: bool) -> Self {
        self.insecure_tls = insecure;
        self
    }

    /// Validate and build, reading [`TOKEN_ENV`] from the process environment.
    pub fn build(self) -> Result<ChainConfig, ConfigError> {
        self.build_with_env(|key| std::env::var(key).ok())
    }

    /// Validate and build with an explicit environment lookup.
    pub fn build_with_env<F>(self, env: F) -> Result<ChainConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // 1. context source
        let context = match (self.api_docs, self.retriever) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingContextSources),
            (Some(docs), None) => ContextSource::Docs(docs),
            (None, Some(retriever)) => ContextSource::Retriever(retriever),
            (None, None) => return Err(ConfigError::MissingContextSource),
        };

        // 2. domain policy
        let allowed_domains = match self.domains {
            DomainPolicy::Unset => return Err(ConfigError::MissingDomainPolicy),
            DomainPolicy::AllowAll => None,
            DomainPolicy::Limit(domains) if domains.is_empty() => {
                return Err(ConfigError::EmptyAllowList)
            }
            DomainPolicy::Limit(domains) => Some(domains),
        };

        // 3. authorization
        let mut headers = self.headers;
        let has_auth = headers.keys().any(|k| k.eq_ignore_ascii_case("authorization"));
        if !has_auth {
            let token = self
                .token
                .filter(|t| !t.is_empty())
                .or_else(|| env(TOKEN_ENV).filter(|t| !t.is_empty()))
                .ok_or(ConfigError::MissingAuthorization)?;
            headers.insert("Authorization".to_string(), token);
        }

        // 4. prompt variables
        let wire_format = self.wire_format;
        let default_request_prompt = match wire_format {
            WireFormat::Json => API_REQUEST_PROMPT_JSON,
            WireFormat::PipeDelimited => API_REQUEST_PROMPT_PIPE,
        };
        let request_prompt = PromptTemplate::new(
            self.request_prompt
                .unwrap_or_else(|| default_request_prompt.to_string()),
        );
        check_variables("request", &request_prompt, &REQUEST_PROMPT_VARIABLES)?;

        let response_prompt = PromptTemplate::new(
            self.response_prompt
                .unwrap_or_else(|| API_RESPONSE_PROMPT.to_string()),
        );
        check_variables("response", &response_prompt, &RESPONSE_PROMPT_VARIABLES)?;

        if let Some(base_url) = &self.base_url {
            check_base_url(base_url)?;
        }

        let mut allowed_methods = Vec::new();
        for method in self.allowed_methods.unwrap_or_else(|| vec![HttpMethod::Get]) {
            if !allowed_methods.contains(&method) {
                allowed_methods.push(method);
            }
        }
        if allowed_methods.is_empty() {
            return Err(ConfigError::NoAllowedMethods);
        }

        Ok(ChainConfig {
            name: self.name.unwrap_or_else(|| "default".to_string()),
            context,
            allowed_domains,
            base_url: self.base_url,
            headers,
            allowed_methods,
            wire_format,
            response_content: self.response_content,
            top_k: self.top_k.unwrap_or(DEFAULT_TOP_K),
            request_prompt,
            response_prompt,
            insecure_tls: self.insecure_tls,
        })
    }
}

fn check_variables(
    prompt: &'static str,
    template: &PromptTemplate,
    expected: &[&str],
) -> Result<(), ConfigError> {
    if template.expects_exactly(expected) {
        return Ok(());
    }
    Err(ConfigError::PromptVariables {
        prompt,
        expected: expected.iter().map(|s| s.to_string()).collect(),
        found: template.input_variables().iter().cloned().collect(),
    })
}

fn check_base_url(base_url: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidBaseUrl {
        url: base_url.to_string(),
        reason: reason.to_string(),
    };
    let parsed = Url::parse(base_url).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if parsed.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    Ok(())
}
