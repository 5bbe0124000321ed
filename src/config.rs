//! Application configuration
//!
//! Loaded from YAML (`--config` / `VMCHAIN_CONFIG`):
//!
//! ```yaml
//! worker_model:
//!   provider: openai
//!   base_url: https://api.groq.com/openai/v1
//!   model: llama-3.1-70b-versatile
//!   api_key_env: GROQ_API_KEY
//! supervisor_model:
//!   provider: ollama
//!   model: phi3
//!   json_mode: true
//! docs: proxmox_api.json
//! context: retriever
//! nodes:
//!   - name: node1
//!     base_url: https://pve1.lab:8006
//!     token_env: NODE1_API_TOKEN
//!     token_base64: true
//!     allowed_methods: [get, post]
//! ```
//!
//! Relative paths are resolved against the config file's directory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::chain::config::DEFAULT_TOP_K;
use crate::chain::{ConfigError, HttpMethod, ResponseContent, TransportError, WireFormat};
use crate::docs::DocsError;
use crate::llm::LlmError;
use crate::router::{RouterError, END};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "VMCHAIN_CONFIG";

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("config has no nodes")]
    NoNodes,

    #[error("node name {0:?} is used more than once")]
    DuplicateNode(String),

    #[error("node name {0:?} is reserved")]
    ReservedNodeName(String),

    #[error("node {node}: environment variable {env} is not set")]
    MissingToken { node: String, env: String },

    #[error("node {node}: token is not valid base64 UTF-8: {reason}")]
    TokenDecode { node: String, reason: String },

    #[error("API key environment variable {0} is not set")]
    MissingApiKey(String),

    #[error(transparent)]
    Docs(#[from] DocsError),

    #[error("node {node}: {source}")]
    Chain {
        node: String,
        #[source]
        source: ConfigError,
    },

    #[error("node {node}: failed to build HTTP client: {source}")]
    Transport {
        node: String,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Router(#[from] RouterError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Ollama,
    /// Any OpenAI-compatible `/chat/completions` endpoint
    #[serde(alias = "groq")]
    Openai,
}

impl Provider {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Ollama => "http://localhost:11434",
            Provider::Openai => "https://api.openai.com/v1",
        }
    }
}

fn default_max_retries() -> u32 {
    2
}

/// One model binding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: Provider,
    /// Defaults to the provider's public endpoint
    #[serde(default)]
    pub base_url: Option<String>,
    pub model: String,
    /// Required for `openai`
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub json_mode: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl ModelConfig {
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
    }
}

/// How chains get their `{api_docs}`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    /// The full documentation text
    #[default]
    Docs,
    /// Top-K endpoint documents from the keyword retriever
    Retriever,
}

fn default_methods() -> Vec<HttpMethod> {
    vec![HttpMethod::Get]
}

/// One backend target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    pub base_url: String,
    /// Environment variable holding the Authorization value
    pub token_env: String,
    /// Whether the variable holds the token base64-encoded
    #[serde(default)]
    pub token_base64: bool,
    #[serde(default = "default_methods")]
    pub allowed_methods: Vec<HttpMethod>,
    /// Accept self-signed certificates
    #[serde(default)]
    pub insecure_tls: bool,
    /// Defaults to `[base_url]`
    #[serde(default)]
    pub limit_to_domains: Option<Vec<String>>,
}

impl NodeConfig {
    /// Read and decode this node's token through `env`.
    pub fn token_with_env<F>(&self, env: F) -> Result<String, AppConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = env(&self.token_env)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| AppConfigError::MissingToken {
                node: self.name.clone(),
                env: self.token_env.clone(),
            })?;

        if !self.token_base64 {
            return Ok(raw.trim().to_string());
        }

        let decode_err = |reason: String| AppConfigError::TokenDecode {
            node: self.name.clone(),
            reason,
        };
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(raw.trim())
            .map_err(|e| decode_err(e.to_string()))?;
        let token = String::from_utf8(bytes).map_err(|e| decode_err(e.to_string()))?;
        Ok(token.trim().to_string())
    }

    /// The node's allow-list; its own base URL unless configured.
    pub fn allowed_domains(&self) -> Vec<String> {
        self.limit_to_domains
            .clone()
            .unwrap_or_else(|| vec![self.base_url.clone()])
    }
}

/// HTTP front-end settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Token bucket capacity
    pub burst: u32,
    /// Token refill rate
    pub per_second: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            burst: 10,
            per_second: 2.0,
        }
    }
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub worker_model: ModelConfig,
    /// Defaults to `worker_model`
    #[serde(default)]
    pub supervisor_model: Option<ModelConfig>,
    /// JSON endpoint documentation
    pub docs: PathBuf,
    #[serde(default)]
    pub context: ContextMode,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub wire_format: WireFormat,
    #[serde(default)]
    pub response_content: ResponseContent,
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub server: ServerConfig,
}

impl AppConfig {
    pub fn from_yaml(text: &str) -> Result<Self, AppConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AppConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| AppConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&text)?;

        if config.docs.is_relative() {
            if let Some(dir) = path.parent() {
                config.docs = dir.join(&config.docs);
            }
        }

        info!(path = %path.display(), nodes = config.nodes.len(), "Loaded config");
        Ok(config)
    }

    pub fn supervisor_model(&self) -> &ModelConfig {
        self.supervisor_model.as_ref().unwrap_or(&self.worker_model)
    }

    pub fn node(&self, name: &str) -> Option<&NodeConfig> {
        self.nodes.iter().find(|n| n.name.eq_ignore_ascii_case(name))
    }

    fn validate(&self) -> Result<(), AppConfigError> {
        if self.nodes.is_empty() {
            return Err(AppConfigError::NoNodes);
        }
        let mut seen = BTreeSet::new();
        for node in &self.nodes {
            if node.name.eq_ignore_ascii_case(END) {
                return Err(AppConfigError::ReservedNodeName(node.name.clone()));
            }
            if !seen.insert(node.name.to_ascii_lowercase()) {
                return Err(AppConfigError::DuplicateNode(node.name.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
worker_model:
  provider: groq
  base_url: https://api.groq.com/openai/v1
  model: llama-3.1-70b-versatile
  api_key_env: GROQ_API_KEY
supervisor_model:
  provider: ollama
  model: phi3
  json_mode: true
docs: proxmox_api.json
context: retriever
nodes:
  - name: node1
    base_url: https://pve1.lab:8006
    token_env: NODE1_API_TOKEN
    token_base64: true
    allowed_methods: [GET, post]
  - name: node5
    base_url: https://pve5.lab:8006
    token_env: NODE5_API_TOKEN
    insecure_tls: true
"#;

    #[test]
    fn test_parse_sample() {
        let config = AppConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.worker_model.provider, Provider::Openai);
        assert_eq!(config.worker_model.max_retries, 2);
        assert_eq!(config.supervisor_model().provider, Provider::Ollama);
        assert_eq!(config.supervisor_model().base_url(), "http://localhost:11434");
        assert_eq!(config.context, ContextMode::Retriever);
        assert_eq!(config.top_k, 3);
        assert_eq!(config.wire_format, WireFormat::Json);
        assert_eq!(config.server.port, 8080);

        let node1 = config.node("node1").unwrap();
        assert_eq!(node1.allowed_methods, vec![HttpMethod::Get, HttpMethod::Post]);
        assert_eq!(node1.allowed_domains(), vec!["https://pve1.lab:8006"]);

        let node5 = config.node("NODE5").unwrap();
        assert_eq!(node5.allowed_methods, vec![HttpMethod::Get]);
        assert!(node5.insecure_tls);
    }

    #[test]
    fn test_token_decoding() {
        let config = AppConfig::from_yaml(SAMPLE).unwrap();
        let node1 = config.node("node1").unwrap();

        // "PVEAPIToken=root@pam!ci=secret"
        let env = |key: &str| {
            (key == "NODE1_API_TOKEN").then(|| "UFZFQVBJVG9rZW49cm9vdEBwYW0hY2k9c2VjcmV0".to_string())
        };
        assert_eq!(node1.token_with_env(env).unwrap(), "PVEAPIToken=root@pam!ci=secret");

        let bad = |_: &str| Some("%%%".to_string());
        assert!(matches!(node1.token_with_env(bad), Err(AppConfigError::TokenDecode { .. })));

        let node5 = config.node("node5").unwrap();
        let err = node5.token_with_env(|_: &str| None).unwrap_err();
        assert!(matches!(err, AppConfigError::MissingToken { ref env, .. } if env == "NODE5_API_TOKEN"));

        let plain = |_: &str| Some(" PVEAPIToken=x \n".to_string());
        assert_eq!(node5.token_with_env(plain).unwrap(), "PVEAPIToken=x");
    }

    #[test]
    fn test_validation() {
        let duplicate = SAMPLE.replace("name: node5", "name: Node1");
        assert!(matches!(
            AppConfig::from_yaml(&duplicate),
            Err(AppConfigError::DuplicateNode(_))
        ));

        let reserved = SAMPLE.replace("name: node5", "name: end");
        assert!(matches!(
            AppConfig::from_yaml(&reserved),
            Err(AppConfigError::ReservedNodeName(_))
        ));

        let unknown_method = SAMPLE.replace("[GET, post]", "[trace]");
        assert!(matches!(
            AppConfig::from_yaml(&unknown_method),
            Err(AppConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_load_example_resolves_docs_next_to_config() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/vmchain.example.yaml");
        let config = AppConfig::load(path).unwrap();
        assert!(config.docs.ends_with("config/proxmox_api.json"));
        assert!(config.docs.exists());
        assert_eq!(config.supervisor_model().provider, Provider::Openai);
        assert_eq!(
            config.node("node5").unwrap().allowed_domains(),
            vec!["https://pve5.lab:8006/api2/json/nodes"]
        );
    }
}
