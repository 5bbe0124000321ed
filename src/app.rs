//! Wiring: models, per-node chains and the routing team from an [`AppConfig`]

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::chain::{ApiChain, ChainConfig, KeywordRetriever, Retriever};
use crate::config::{AppConfig, AppConfigError, ContextMode, ModelConfig, NodeConfig, Provider};
use crate::docs::ApiDocs;
use crate::llm::{LanguageModel, OllamaClient, OpenAiClient, RetryPolicy};
use crate::router::{Supervisor, Team};

/// Build a model binding. API keys are read through `env`.
pub fn build_model<F>(config: &ModelConfig, env: F) -> Result<Arc<dyn LanguageModel>, AppConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let retry = RetryPolicy {
        max_retries: config.max_retries,
        delay: Duration::from_millis(250),
    };

    let model: Arc<dyn LanguageModel> = match config.provider {
        Provider::Ollama => Arc::new(
            OllamaClient::new(config.base_url())
                .with_retry(retry)
                .model(config.model.as_str())
                .json_mode(config.json_mode),
        ),
        Provider::Openai => {
            let key_env = config.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY");
            let api_key = env(key_env).ok_or_else(|| AppConfigError::MissingApiKey(key_env.to_string()))?;
            Arc::new(
                OpenAiClient::new(config.base_url(), api_key)
                    .with_retry(retry)
                    .model(config.model.as_str())
                    .json_mode(config.json_mode),
            )
        }
    };
    Ok(model)
}

/// Build the chain for one node.
pub fn build_chain<F>(
    app: &AppConfig,
    node: &NodeConfig,
    docs: &ApiDocs,
    model: Arc<dyn LanguageModel>,
    env: F,
) -> Result<ApiChain, AppConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let token = node.token_with_env(&env)?;

    let builder = ChainConfig::builder()
        .name(node.name.as_str())
        .base_url(node.base_url.as_str())
        .limit_to_domains(node.allowed_domains())
        .token(token)
        .allowed_http_methods(node.allowed_methods.iter().copied())
        .wire_format(app.wire_format)
        .response_content(app.response_content)
        .top_k(app.top_k)
        .insecure_tls(node.insecure_tls);

    let builder = match app.context {
        ContextMode::Docs => builder.api_docs(docs.combined()),
        ContextMode::Retriever => {
            let retriever: Arc<dyn Retriever> = Arc::new(KeywordRetriever::new(docs.documents()));
            builder.retriever(retriever)
        }
    };

    let config = builder.build_with_env(&env).map_err(|source| AppConfigError::Chain {
        node: node.name.clone(),
        source,
    })?;

    ApiChain::with_http(config, model).map_err(|source| AppConfigError::Transport {
        node: node.name.clone(),
        source,
    })
}

/// Build the supervisor and one worker chain per configured node.
pub fn build_team<F>(config: &AppConfig, env: F) -> Result<Team, AppConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let docs = ApiDocs::load(&config.docs)?;
    let worker_model = build_model(&config.worker_model, &env)?;
    let supervisor_model = build_model(config.supervisor_model(), &env)?;

    let mut team = Team::new(Supervisor::new(supervisor_model));
    for node in &config.nodes {
        let chain = build_chain(config, node, &docs, worker_model.clone(), &env)?;
        team.add_worker(node.name.as_str(), Arc::new(chain))?;
    }

    info!(
        nodes = ?team.members(),
        endpoints = docs.entries().len(),
        context = ?config.context,
        "Team ready"
    );
    Ok(team)
}

/// [`build_team`] against the process environment.
pub fn build_team_from_env(config: &AppConfig) -> Result<Team, AppConfigError> {
    build_team(config, |key| std::env::var(key).ok())
}
