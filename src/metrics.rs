//! Prometheus metrics for chains, model calls and routing
//!
//! All metrics live in the default prometheus registry and are exposed by the
//! HTTP front-end at `GET /metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    // ─────────────────────────────────────────────────────────────────────────────
    // Chain Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Chain invocations by node and outcome.
    ///
    /// Labels:
    /// - node: chain name (one per backend target)
    /// - outcome: "ok", or a `ChainError::kind()` label such as "parse_error"
    pub static ref CHAIN_RUNS: CounterVec = register_counter_vec!(
        "vmchain_chain_runs_total",
        "Total API chain invocations by node and outcome",
        &["node", "outcome"]
    ).expect("failed to register CHAIN_RUNS metric");

    /// End-to-end chain latency, question in to answer out.
    pub static ref CHAIN_DURATION: HistogramVec = register_histogram_vec!(
        "vmchain_chain_duration_seconds",
        "API chain invocation duration in seconds",
        &["node"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0]
    ).expect("failed to register CHAIN_DURATION metric");

    /// Model call latency.
    ///
    /// Labels:
    /// - model: model name as reported by the provider binding
    /// - stage: "request", "response" or "supervisor"
    pub static ref LLM_CALL_DURATION: HistogramVec = register_histogram_vec!(
        "vmchain_llm_call_duration_seconds",
        "Language model call duration in seconds",
        &["model", "stage"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    ).expect("failed to register LLM_CALL_DURATION metric");

    /// Requests sent to target APIs.
    ///
    /// Labels:
    /// - status: HTTP status code, or "transport_error"
    pub static ref API_REQUESTS: CounterVec = register_counter_vec!(
        "vmchain_api_requests_total",
        "Requests executed against target APIs",
        &["node", "method", "status"]
    ).expect("failed to register API_REQUESTS metric");

    /// Model-generated URLs rejected by the domain guard.
    pub static ref DOMAIN_VIOLATIONS: CounterVec = register_counter_vec!(
        "vmchain_domain_violations_total",
        "Synthesized URLs rejected by the domain allow-list",
        &["node"]
    ).expect("failed to register DOMAIN_VIOLATIONS metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Router & Server Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Supervisor decisions. `target` is a worker name or "end".
    pub static ref ROUTER_DECISIONS: CounterVec = register_counter_vec!(
        "vmchain_router_decisions_total",
        "Supervisor routing decisions by target",
        &["target"]
    ).expect("failed to register ROUTER_DECISIONS metric");

    pub static ref RATE_LIMITED: Counter = register_counter!(
        "vmchain_rate_limited_total",
        "HTTP requests rejected by the rate limiter"
    ).expect("failed to register RATE_LIMITED metric");
}

/// Render the default registry in the Prometheus text exposition format.
pub fn render() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}
