//! HTTP front-end
//!
//! Routes:
//! - `POST /invoke` `{question}`: supervisor routing across all nodes
//! - `GET /nodes`: configured nodes
//! - `POST /nodes/:name/invoke` `{question}`: ask one node's chain directly
//! - `GET /metrics`: Prometheus exposition
//!
//! The two invoke routes share one token bucket.

pub mod rate_limit;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub use rate_limit::RateLimiter;

use crate::chain::{ChainError, HttpMethod};
use crate::config::ServerConfig;
use crate::metrics;
use crate::router::{RouterError, Team};

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    pub team: Arc<Team>,
    pub limiter: Arc<RateLimiter>,
}

impl ServerState {
    pub fn new(team: Team, config: &ServerConfig) -> Self {
        Self {
            team: Arc::new(team),
            limiter: Arc::new(RateLimiter::new(config.burst, config.per_second)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct NodeInfo {
    pub name: String,
    pub base_url: Option<String>,
    pub allowed_methods: Vec<HttpMethod>,
}

/// Error body: `{"error": ..., "kind": ...}`
#[derive(Debug)]
pub enum ApiError {
    UnknownNode(String),
    EmptyQuestion,
    Chain(ChainError),
    Router(RouterError),
}

impl From<ChainError> for ApiError {
    fn from(e: ChainError) -> Self {
        ApiError::Chain(e)
    }
}

impl From<RouterError> for ApiError {
    fn from(e: RouterError) -> Self {
        ApiError::Router(e)
    }
}

fn chain_status(e: &ChainError) -> StatusCode {
    match e {
        ChainError::OutputParse(_) | ChainError::UnsupportedMethod { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ChainError::DomainViolation { .. } => StatusCode::FORBIDDEN,
        ChainError::Transport(_) | ChainError::Llm(_) => StatusCode::BAD_GATEWAY,
        ChainError::Retrieval(_) | ChainError::Runtime(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self {
            ApiError::UnknownNode(name) => (
                StatusCode::NOT_FOUND,
                "unknown_node",
                format!("no node named {name}"),
            ),
            ApiError::EmptyQuestion => (
                StatusCode::BAD_REQUEST,
                "empty_question",
                "question must not be empty".to_string(),
            ),
            ApiError::Chain(e) => (chain_status(e), e.kind(), e.to_string()),
            ApiError::Router(e @ RouterError::Worker { source, .. }) => {
                (chain_status(source), source.kind(), e.to_string())
            }
            ApiError::Router(RouterError::Supervisor(e)) => {
                (StatusCode::BAD_GATEWAY, "supervisor_error", e.to_string())
            }
            ApiError::Router(e) => (StatusCode::INTERNAL_SERVER_ERROR, "router_error", e.to_string()),
        };

        if status.is_server_error() {
            warn!(kind, error = %message, "Request failed");
        }
        (status, Json(serde_json::json!({ "error": message, "kind": kind }))).into_response()
    }
}

/// Create the application router
pub fn create_router(state: ServerState) -> Router {
    let invoke = Router::new()
        .route("/invoke", post(invoke_team))
        .route("/nodes/:name/invoke", post(invoke_node))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .route("/nodes", get(list_nodes))
        .route("/metrics", get(metrics_text))
        .merge(invoke)
        .with_state(state)
}

async fn rate_limit(State(state): State<ServerState>, request: Request, next: Next) -> Response {
    if !state.limiter.try_acquire() {
        metrics::RATE_LIMITED.inc();
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({ "error": "rate limit exceeded", "kind": "rate_limited" })),
        )
            .into_response();
    }
    next.run(request).await
}

async fn invoke_team(
    State(state): State<ServerState>,
    Json(body): Json<QuestionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let question = body.question.trim();
    if question.is_empty() {
        return Err(ApiError::EmptyQuestion);
    }
    let outcome = state.team.route_and_answer(question).await?;
    Ok(Json(outcome))
}

async fn invoke_node(
    State(state): State<ServerState>,
    Path(name): Path<String>,
    Json(body): Json<QuestionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let question = body.question.trim();
    if question.is_empty() {
        return Err(ApiError::EmptyQuestion);
    }
    let chain = state
        .team
        .worker(&name)
        .ok_or_else(|| ApiError::UnknownNode(name.clone()))?;
    let output = chain.invoke(question).await?;
    Ok(Json(output))
}

async fn list_nodes(State(state): State<ServerState>) -> Json<Vec<NodeInfo>> {
    let nodes = state
        .team
        .members()
        .into_iter()
        .filter_map(|name| {
            let config = state.team.worker(&name)?.config();
            Some(NodeInfo {
                base_url: config.base_url().map(str::to_string),
                allowed_methods: config.allowed_methods().to_vec(),
                name,
            })
        })
        .collect();
    Json(nodes)
}

async fn metrics_text() -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}

/// Bind and serve until Ctrl-C.
pub async fn serve(team: Team, config: &ServerConfig) -> std::io::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let app = create_router(ServerState::new(team, config));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
}
