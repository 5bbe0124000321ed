//! End-to-end tests of the API chain with scripted model and executor doubles

mod common;

use std::sync::Arc;

use common::{RecordingExecutor, ScriptedModel, DOCS, TOKEN};
use vmchain::chain::{
    ApiChain, ChainConfig, ChainConfigBuilder, ChainError, ChainStage, ConfigError, KeywordRetriever,
    Retriever, WireFormat,
};
use vmchain::HttpMethod;

const NODE1: &str = "https://pve1.lab:8006";

const VM_LIST: &str = r#"{"data":[{"vmid":100,"name":"web","status":"running"},{"vmid":101,"name":"db","status":"stopped"}]}"#;

fn node1() -> ChainConfigBuilder {
    ChainConfig::builder()
        .name("node1")
        .api_docs(DOCS)
        .base_url(NODE1)
        .limit_to_domains([NODE1])
        .token(TOKEN)
}

fn chain(config: ChainConfig, model: &Arc<ScriptedModel>, executor: &Arc<RecordingExecutor>) -> ApiChain {
    ApiChain::new(config, model.clone(), executor.clone())
}

#[tokio::test]
async fn test_list_vms_end_to_end() {
    let model = ScriptedModel::new([
        r#"{"api_url": "/api2/json/nodes/n1/qemu", "request_method": "GET", "request_body": {}}"#,
        "Node n1 has two VMs: web (running) and db (stopped).",
    ]);
    let executor = RecordingExecutor::ok(200, "OK", VM_LIST);
    let chain = chain(node1().build().unwrap(), &model, &executor);

    let output = chain.invoke("list VMs on node n1").await.unwrap();
    assert_eq!(output.output, "Node n1 has two VMs: web (running) and db (stopped).");
    assert!(output.error.is_none());
    assert_eq!(
        output.stages,
        vec![
            ChainStage::Start,
            ChainStage::Synthesizing,
            ChainStage::DomainCheck,
            ChainStage::Executing,
            ChainStage::Summarizing,
            ChainStage::Done,
        ]
    );

    let calls = executor.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, HttpMethod::Get);
    assert_eq!(calls[0].url, "https://pve1.lab:8006/api2/json/nodes/n1/qemu");
    assert!(calls[0].body.is_none());
    assert_eq!(calls[0].headers["Authorization"], TOKEN);

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("list VMs on node n1"));
    assert!(prompts[0].contains("/nodes/{node}/qemu"));
    assert!(prompts[1].contains("Status: 200 OK"));
    assert!(prompts[1].contains(r#""name":"web""#));
    assert!(prompts[1].contains("https://pve1.lab:8006/api2/json/nodes/n1/qemu"));
}

#[tokio::test]
async fn test_disallowed_host_is_rejected_before_any_call() {
    let config = ChainConfig::builder()
        .api_docs(DOCS)
        .limit_to_domains([NODE1])
        .token(TOKEN)
        .build()
        .unwrap();
    let model = ScriptedModel::new([
        r#"{"api_url": "https://evil.example/api2/json/nodes", "request_method": "GET", "request_body": {}}"#,
    ]);
    let executor = RecordingExecutor::ok(200, "OK", "{}");
    let chain = chain(config, &model, &executor);

    let err = chain.invoke("list nodes").await.unwrap_err();
    match err {
        ChainError::DomainViolation { url, allowed } => {
            assert_eq!(url, "https://evil.example/api2/json/nodes");
            assert_eq!(allowed, vec![NODE1.to_string()]);
        }
        other => panic!("expected domain violation, got {other:?}"),
    }
    assert!(executor.calls().is_empty());
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn test_malformed_output_returns_error_without_calling() {
    let model = ScriptedModel::new([r#"{"api_url": "/api2/json/nodes/n1/qemu", "request_body": {}}"#]);
    let executor = RecordingExecutor::ok(200, "OK", VM_LIST);
    let chain = chain(node1().build().unwrap(), &model, &executor);

    let output = chain.invoke("list VMs on node n1").await.unwrap();
    assert_eq!(output.output, "");
    let error = output.error.as_deref().unwrap();
    assert!(error.contains("request_method"), "{error}");
    assert_eq!(output.stages.last(), Some(&ChainStage::Error));
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn test_post_with_invalid_body_is_a_parse_error() {
    let model = ScriptedModel::new(["/api2/json/nodes/n1/qemu/101/status/start|POST|vmid=101"]);
    let executor = RecordingExecutor::ok(200, "OK", "{}");
    let config = node1()
        .wire_format(WireFormat::PipeDelimited)
        .allowed_http_methods([HttpMethod::Get, HttpMethod::Post])
        .build()
        .unwrap();
    let chain = chain(config, &model, &executor);

    let output = chain.invoke("start VM 101 on n1").await.unwrap();
    assert!(output.is_error());
    assert!(output.error.unwrap().contains("request_body for post"));
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn test_post_with_empty_or_null_body_is_never_sent() {
    for body in [r#""""#, "null"] {
        let reply = format!(
            r#"{{"api_url": "/api2/json/nodes/n1/qemu/101/status/stop", "request_method": "POST", "request_body": {body}}}"#
        );
        let model = ScriptedModel::new([reply, "stopped".to_string()]);
        let executor = RecordingExecutor::ok(200, "OK", r#"{"data":"UPID:n1:0002"}"#);
        let config = node1()
            .allowed_http_methods([HttpMethod::Get, HttpMethod::Post])
            .build()
            .unwrap();
        let chain = chain(config, &model, &executor);

        let output = chain.invoke("stop VM 101 on n1").await.unwrap();
        assert_eq!(output.output, "", "body {body}");
        assert!(output.error.as_deref().unwrap().contains("request_body for post"));
        assert!(executor.calls().is_empty(), "body {body}");
        assert_eq!(model.calls(), 1);
    }
}

#[tokio::test]
async fn test_pipe_delimited_post_sends_body() {
    let model = ScriptedModel::new([
        r#"/api2/json/nodes/n1/qemu/101/status/start|POST|{"node": "n1", "vmid": 101}"#,
        "VM 101 is starting.",
    ]);
    let executor = RecordingExecutor::ok(200, "OK", r#"{"data":"UPID:n1:0001"}"#);
    let config = node1()
        .wire_format(WireFormat::PipeDelimited)
        .allowed_http_methods([HttpMethod::Get, HttpMethod::Post])
        .build()
        .unwrap();
    let chain = chain(config, &model, &executor);

    let output = chain.invoke("start VM 101 on n1").await.unwrap();
    assert_eq!(output.output, "VM 101 is starting.");

    let calls = executor.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, HttpMethod::Post);
    let body = calls[0].body.as_ref().unwrap();
    assert_eq!(body["vmid"], 101);
    assert_eq!(body["node"], "n1");
}

#[tokio::test]
async fn test_get_never_sends_a_body() {
    let model = ScriptedModel::new([
        r#"{"api_url": "/api2/json/nodes/n1/qemu", "request_method": "get", "request_body": {"full": 1}}"#,
        "done",
    ]);
    let executor = RecordingExecutor::ok(200, "OK", VM_LIST);
    let chain = chain(node1().build().unwrap(), &model, &executor);

    chain.invoke("list VMs on node n1").await.unwrap();
    let calls = executor.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].body.is_none());
}

#[tokio::test]
async fn test_base_url_join_is_checked_against_allow_list() {
    let config = node1().build().unwrap();
    let model = ScriptedModel::new(Vec::<String>::new());
    let executor = RecordingExecutor::ok(200, "OK", "{}");
    let chain = chain(config, &model, &executor);

    assert_eq!(
        chain.resolve_url("/api2/json/version"),
        "https://pve1.lab:8006/api2/json/version"
    );
    assert_eq!(
        chain.resolve_url("api2/json/version"),
        "https://pve1.lab:8006/api2/json/version"
    );
}

#[tokio::test]
async fn test_upstream_error_is_passed_to_the_response_synthesizer() {
    let model = ScriptedModel::new([
        r#"{"api_url": "/api2/json/nodes/n9/qemu", "request_method": "GET", "request_body": {}}"#,
        "Node n9 does not exist.",
    ]);
    let executor = RecordingExecutor::ok(404, "Not Found", r#"{"data":null}"#);
    let chain = chain(node1().build().unwrap(), &model, &executor);

    let output = chain.invoke("list VMs on node n9").await.unwrap();
    assert_eq!(output.output, "Node n9 does not exist.");
    assert!(output.error.is_none());

    let prompts = model.prompts();
    assert!(prompts[1].contains("The API responded with an error."));
    assert!(prompts[1].contains("Status: 404 Not Found"));
}

#[tokio::test]
async fn test_transport_failure_is_fatal() {
    let model = ScriptedModel::new([
        r#"{"api_url": "/api2/json/nodes/n1/qemu", "request_method": "GET", "request_body": {}}"#,
    ]);
    let executor = RecordingExecutor::failing("connection refused");
    let chain = chain(node1().build().unwrap(), &model, &executor);

    let err = chain.invoke("list VMs on node n1").await.unwrap_err();
    assert!(matches!(err, ChainError::Transport(_)));
    assert_eq!(err.kind(), "transport_error");
    assert_eq!(executor.calls().len(), 1);
}

#[tokio::test]
async fn test_method_outside_allowed_set_is_not_called() {
    let model = ScriptedModel::new([
        r#"{"api_url": "/api2/json/nodes/n1/qemu/101", "request_method": "DELETE", "request_body": {}}"#,
        "Deleting VMs is not permitted on this node.",
    ]);
    let executor = RecordingExecutor::ok(200, "OK", "{}");
    let chain = chain(node1().build().unwrap(), &model, &executor);

    let output = chain.invoke("delete VM 101 on n1").await.unwrap();
    assert_eq!(output.output, "Deleting VMs is not permitted on this node.");
    assert!(executor.calls().is_empty());
    assert!(model.prompts()[1].contains("Request method delete is not allowed."));
}

#[tokio::test]
async fn test_unknown_method_is_fatal() {
    let model = ScriptedModel::new([
        r#"{"api_url": "/api2/json/nodes/n1/qemu", "request_method": "FETCH", "request_body": {}}"#,
    ]);
    let executor = RecordingExecutor::ok(200, "OK", "{}");
    let chain = chain(node1().build().unwrap(), &model, &executor);

    let err = chain.invoke("list VMs on node n1").await.unwrap_err();
    match err {
        ChainError::UnsupportedMethod { method } => assert_eq!(method, "fetch"),
        other => panic!("expected unsupported method, got {other:?}"),
    }
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn test_model_failure_is_fatal() {
    let model = ScriptedModel::new(Vec::<String>::new());
    let executor = RecordingExecutor::ok(200, "OK", "{}");
    let chain = chain(node1().build().unwrap(), &model, &executor);

    let err = chain.invoke("list VMs on node n1").await.unwrap_err();
    assert_eq!(err.kind(), "llm_error");
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn test_null_allow_list_permits_any_host() {
    let config = ChainConfig::builder()
        .api_docs(DOCS)
        .allow_all_domains()
        .token(TOKEN)
        .build()
        .unwrap();
    let model = ScriptedModel::new([
        r#"{"api_url": "https://pve7.lab:8006/api2/json/version", "request_method": "GET", "request_body": {}}"#,
        "Version 8.1",
    ]);
    let executor = RecordingExecutor::ok(200, "OK", r#"{"data":{"version":"8.1"}}"#);
    let chain = chain(config, &model, &executor);

    let output = chain.invoke("which version").await.unwrap();
    assert_eq!(output.output, "Version 8.1");
    assert_eq!(executor.calls()[0].url, "https://pve7.lab:8006/api2/json/version");
}

#[tokio::test]
async fn test_retriever_context_is_used_by_both_synthesizers() {
    let retriever: Arc<dyn Retriever> = Arc::new(KeywordRetriever::new(vec![
        "GET /nodes/{node}/qemu - List virtual machines".to_string(),
        "GET /cluster/resources - Cluster resources".to_string(),
    ]));
    let config = ChainConfig::builder()
        .retriever(retriever)
        .base_url(NODE1)
        .limit_to_domains([NODE1])
        .token(TOKEN)
        .top_k(1)
        .build()
        .unwrap();
    let model = ScriptedModel::new([
        r#"{"api_url": "/api2/json/nodes/n1/qemu", "request_method": "GET", "request_body": {}}"#,
        "Two VMs.",
    ]);
    let executor = RecordingExecutor::ok(200, "OK", VM_LIST);
    let chain = chain(config, &model, &executor);

    chain.invoke("list virtual machines on node n1").await.unwrap();
    let prompts = model.prompts();
    for prompt in &prompts {
        assert!(prompt.contains("List virtual machines"));
        assert!(!prompt.contains("Cluster resources"));
    }
}

#[test]
fn test_blocking_invoke_matches_async() {
    let model = ScriptedModel::new([
        r#"{"api_url": "https://evil.example/api2/json/nodes", "request_method": "GET", "request_body": {}}"#,
    ]);
    let executor = RecordingExecutor::ok(200, "OK", "{}");
    let config = ChainConfig::builder()
        .api_docs(DOCS)
        .limit_to_domains([NODE1])
        .token(TOKEN)
        .build()
        .unwrap();
    let chain = chain(config, &model, &executor);

    let err = chain.invoke_blocking("list nodes").unwrap_err();
    assert_eq!(err.kind(), "domain_violation");
    assert!(executor.calls().is_empty());

    let model = ScriptedModel::new([
        r#"{"api_url": "/api2/json/nodes/n1/qemu", "request_method": "GET", "request_body": {}}"#,
        "Two VMs.",
    ]);
    let executor = RecordingExecutor::ok(200, "OK", VM_LIST);
    let chain = self::chain(node1().build().unwrap(), &model, &executor);
    let output = chain.invoke_blocking("list VMs on node n1").unwrap();
    assert_eq!(output.output, "Two VMs.");
    assert_eq!(executor.calls().len(), 1);
}

#[tokio::test]
async fn test_blocking_invoke_inside_runtime_is_an_error() {
    let model = ScriptedModel::new([
        r#"{"api_url": "/api2/json/nodes/n1/qemu", "request_method": "GET", "request_body": {}}"#,
    ]);
    let executor = RecordingExecutor::ok(200, "OK", VM_LIST);
    let chain = chain(node1().build().unwrap(), &model, &executor);

    let err = chain.invoke_blocking("list VMs on node n1").unwrap_err();
    assert_eq!(err.kind(), "runtime_error");
    assert_eq!(model.calls(), 0);
    assert!(executor.calls().is_empty());
}

#[test]
fn test_construction_errors() {
    let err = node1().limit_to_domains(Vec::<String>::new()).build().err().unwrap();
    assert_eq!(err, ConfigError::EmptyAllowList);

    let err = ChainConfig::builder()
        .limit_to_domains([NODE1])
        .token(TOKEN)
        .build()
        .err()
        .unwrap();
    assert_eq!(err, ConfigError::MissingContextSource);

    let err = ChainConfig::builder()
        .api_docs(DOCS)
        .limit_to_domains([NODE1])
        .build_with_env(|_| None)
        .err()
        .unwrap();
    assert_eq!(err, ConfigError::MissingAuthorization);
}
