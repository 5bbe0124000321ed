//! Test doubles shared by the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};

use vmchain::chain::{ApiResponse, Headers, RequestExecutor, TransportError};
use vmchain::llm::{LanguageModel, LlmError};
use vmchain::HttpMethod;

pub const DOCS: &str = r#"GET /nodes/{node}/qemu - List virtual machines on a node
POST /nodes/{node}/qemu/{vmid}/status/start - Start a virtual machine
POST /nodes/{node}/qemu/{vmid}/status/stop - Stop a virtual machine"#;

pub const TOKEN: &str = "PVEAPIToken=root@pam!ci=secret";

/// Model that replays queued replies and records every prompt it was given.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn infer(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(LlmError::EmptyResponse)
    }
}

/// One call seen by [`RecordingExecutor`]
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Headers,
    pub body: Option<Map<String, Value>>,
}

/// Executor that records calls and answers with a fixed response.
pub struct RecordingExecutor {
    response: Result<ApiResponse, String>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl RecordingExecutor {
    pub fn ok(status: u16, reason: &str, body: &str) -> Arc<Self> {
        Arc::new(Self {
            response: Ok(ApiResponse {
                status,
                reason: reason.to_string(),
                body: body.to_string(),
            }),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            response: Err(message.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RequestExecutor for RecordingExecutor {
    async fn send(
        &self,
        method: HttpMethod,
        url: &str,
        headers: &Headers,
        body: Option<&Map<String, Value>>,
    ) -> Result<ApiResponse, TransportError> {
        self.calls.lock().unwrap().push(RecordedCall {
            method,
            url: url.to_string(),
            headers: headers.clone(),
            body: body.cloned(),
        });
        self.response
            .clone()
            .map_err(TransportError::Connect)
    }
}
