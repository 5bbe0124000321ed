//! Ollama API client for LLM inference

use async_trait::async_trait;
use serde::Deserialize;

use super::{LanguageModel, LlmError, RetryPolicy};

/// Response from Ollama's generate endpoint with metadata
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    /// The generated text
    pub response: String,
    #[serde(default)]
    pub done: bool,
    /// Number of tokens generated
    #[serde(default)]
    pub eval_count: u32,
    /// Number of tokens in the prompt
    #[serde(default)]
    pub prompt_eval_count: u32,
    /// Time spent generating tokens (nanoseconds)
    #[serde(default, rename = "eval_duration")]
    pub eval_duration_ns: u64,
}

/// Client for interacting with Ollama's HTTP API
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl OllamaClient {
    /// Create a new Ollama client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the Ollama server (e.g., "http://localhost:11434")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Bind this client to a model name, producing a [`LanguageModel`].
    pub fn model(&self, model: impl Into<String>) -> OllamaModel {
        OllamaModel {
            client: self.clone(),
            model: model.into(),
            json_mode: false,
        }
    }

    /// Generate a complete (non-streaming) response from Ollama
    ///
    /// Temperature is pinned to 0 so that structured output stays parseable.
    /// With `json_mode` the server constrains the output to a JSON document.
    pub async fn generate(
        &self,
        prompt: &str,
        model: &str,
        json_mode: bool,
    ) -> Result<GenerateResponse, LlmError> {
        let endpoint = format!("{}/api/generate", self.base_url.trim_end_matches('/'));

        let mut body = serde_json::json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": 0.0
            }
        });
        if json_mode {
            body["format"] = serde_json::Value::String("json".to_string());
        }

        let client = &self.client;
        let endpoint = endpoint.as_str();
        let body = &body;
        self.retry
            .run("ollama_generate", || async move {
                let response = client.post(endpoint).json(body).send().await?;
                let status = response.status();
                let text = response.text().await?;

                if !status.is_success() {
                    return Err(LlmError::Status { status: status.as_u16(), body: text });
                }
                if text.is_empty() {
                    return Err(LlmError::EmptyResponse);
                }

                Ok(serde_json::from_str::<GenerateResponse>(&text)?)
            })
            .await
    }
}

/// An Ollama model bound to a client
#[derive(Clone)]
pub struct OllamaModel {
    client: OllamaClient,
    model: String,
    json_mode: bool,
}

impl OllamaModel {
    /// Ask Ollama to constrain output to JSON (`"format": "json"`).
    pub fn json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn infer(&self, prompt: &str) -> Result<String, LlmError> {
        let response = self.client.generate(prompt, &self.model, self.json_mode).await?;
        tracing::debug!(
            model = %self.model,
            eval_count = response.eval_count,
            prompt_eval_count = response.prompt_eval_count,
            eval_duration_ns = response.eval_duration_ns,
            "Ollama generation finished"
        );
        Ok(response.response)
    }
}
