//! OpenAI-compatible chat completions client
//!
//! Works against any server that speaks `POST {base_url}/chat/completions`
//! (Groq, vLLM, LM Studio, OpenAI itself). The prompt is sent as a single
//! user message.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{LanguageModel, LlmError, RetryPolicy};

/// A message in a chat conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String, // "user", "assistant"
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
            retry: RetryPolicy::default(),
        }
    }

    /// Read the API key from `env_var`.
    pub fn from_env(base_url: impl Into<String>, env_var: &str) -> Result<Self, LlmError> {
        let api_key =
            std::env::var(env_var).map_err(|_| LlmError::MissingApiKey(env_var.to_string()))?;
        Ok(Self::new(base_url, api_key))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self, model: impl Into<String>) -> OpenAiModel {
        OpenAiModel {
            client: self.clone(),
            model: model.into(),
            json_mode: false,
        }
    }

    /// Send a chat request and return the first choice's content
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        model: &str,
        json_mode: bool,
    ) -> Result<String, LlmError> {
        let endpoint = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "temperature": 0.0,
            "stream": false
        });
        if json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        let client = &self.client;
        let api_key = self.api_key.as_str();
        let endpoint = endpoint.as_str();
        let body = &body;
        let completion = self
            .retry
            .run("chat_completion", || async move {
                let response = client
                    .post(endpoint)
                    .bearer_auth(api_key)
                    .json(body)
                    .send()
                    .await?;
                let status = response.status();
                let text = response.text().await?;

                if !status.is_success() {
                    return Err(LlmError::Status { status: status.as_u16(), body: text });
                }
                Ok(serde_json::from_str::<CompletionResponse>(&text)?)
            })
            .await?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(LlmError::EmptyResponse)
    }
}

/// An OpenAI-compatible model bound to a client
#[derive(Clone)]
pub struct OpenAiModel {
    client: OpenAiClient,
    model: String,
    json_mode: bool,
}

impl OpenAiModel {
    pub fn json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn infer(&self, prompt: &str) -> Result<String, LlmError> {
        let messages = [ChatMessage::user(prompt)];
        self.client.complete(&messages, &self.model, self.json_mode).await
    }
}
