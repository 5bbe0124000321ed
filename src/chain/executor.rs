//! Request executor
//!
//! The chain talks to the backend through [`RequestExecutor`]. The production
//! implementation is [`HttpExecutor`] (reqwest, fixed 10 second timeout, no
//! retries). Non-2xx responses are returned, not raised: the response
//! synthesizer gets to explain them. Only transport failures are errors.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::request::HttpMethod;

/// Fixed bound on a single API call
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Header name -> value
pub type Headers = BTreeMap<String, String>;

/// The call never produced an HTTP response
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(REQUEST_TIMEOUT)
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

/// A non-2xx answer from the target API. Context for the answer, not a failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("The API responded with an error. Status: {status} {reason}")]
pub struct UpstreamHttpError {
    pub status: u16,
    pub reason: String,
}

/// How an [`ApiResponse`] is handed to the response synthesizer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseContent {
    /// Body text only
    Text,
    /// Body re-serialized as compact JSON
    Json,
    /// `Status: <code> <reason>` followed by the body
    #[default]
    Status,
}

/// Normalized response from the target API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub reason: String,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn upstream_error(&self) -> Option<UpstreamHttpError> {
        (!self.is_success()).then(|| UpstreamHttpError {
            status: self.status,
            reason: self.reason.clone(),
        })
    }

    /// Text given to the response synthesizer as `{api_response}`.
    pub fn render(&self, mode: ResponseContent) -> String {
        let content = match mode {
            ResponseContent::Text => self.body.clone(),
            ResponseContent::Json => match serde_json::from_str::<Value>(&self.body) {
                Ok(value) => value.to_string(),
                Err(_) => r#"{"error": "Failed to parse response JSON"}"#.to_string(),
            },
            ResponseContent::Status => {
                format!("Status: {} {}\nResponse: {}", self.status, self.reason, self.body)
            }
        };

        match self.upstream_error() {
            Some(_) => format!("The API responded with an error.\n{content}"),
            None => content,
        }
    }
}

/// Capability to send one HTTP request
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    /// `body` is only passed for methods that carry one.
    async fn send(
        &self,
        method: HttpMethod,
        url: &str,
        headers: &Headers,
        body: Option<&Map<String, Value>>,
    ) -> Result<ApiResponse, TransportError>;
}

/// reqwest-backed executor
#[derive(Clone)]
pub struct HttpExecutor {
    client: reqwest::Client,
}

impl HttpExecutor {
    /// `insecure_tls` accepts self-signed certificates, which hypervisor
    /// management APIs commonly ship with.
    pub fn new(insecure_tls: bool) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(insecure_tls)
            .build()?;
        Ok(Self { client })
    }

    /// Build the request without sending it. GET and DELETE never get a body.
    pub fn build_request(
        &self,
        method: HttpMethod,
        url: &str,
        headers: &Headers,
        body: Option<&Map<String, Value>>,
    ) -> Result<reqwest::Request, TransportError> {
        let mut builder = match method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
            HttpMethod::Put => self.client.put(url),
            HttpMethod::Patch => self.client.patch(url),
            HttpMethod::Delete => self.client.delete(url),
        };

        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if method.carries_body() {
            let empty = Map::new();
            builder = builder.json(body.unwrap_or(&empty));
        }

        Ok(builder.build()?)
    }
}

#[async_trait]
impl RequestExecutor for HttpExecutor {
    async fn send(
        &self,
        method: HttpMethod,
        url: &str,
        headers: &Headers,
        body: Option<&Map<String, Value>>,
    ) -> Result<ApiResponse, TransportError> {
        let request = self.build_request(method, url, headers, body)?;
        let response = self.client.execute(request).await?;

        let status = response.status();
        let reason = status.canonical_reason().unwrap_or("").to_string();
        let body = response.text().await?;

        Ok(ApiResponse {
            status: status.as_u16(),
            reason,
            body,
        })
    }
}
