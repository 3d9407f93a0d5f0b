use std::collections::HashMap;

use axum::{http::HeaderMap, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use collector_core::models::{
    CollectionContext, ConnectionParams, MetricDefinition, MetricProtocolMapping,
};
use collector_core::traits::MetricCollector;
use collector_core::SchedulerError;
use collector_testing_utils::{asset, params};
use collector_worker::HttpJsonCollector;
use serde_json::json;

async fn status(headers: HeaderMap) -> impl IntoResponse {
    if headers.get("x-token").and_then(|v| v.to_str().ok()) != Some("secret") {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({
        "cpu": {"usage": 37.5},
        "memory": {"used_bytes": "1048576"},
        "disks": [{"name": "sda", "usage": 81}],
        "state": "running"
    }))
    .into_response()
}

async fn not_json() -> &'static str {
    "plain text"
}

async fn start_server() -> String {
    let app = Router::new()
        .route("/status", get(status))
        .route("/text", get(not_json));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn context(connection_params: ConnectionParams) -> CollectionContext {
    let metrics = vec![
        MetricDefinition::new(1, "cpu_usage", "cpu", "http"),
        MetricDefinition::new(2, "mem_used_mb", "memory", "http"),
        MetricDefinition::new(3, "disk_usage", "disk", "http"),
        MetricDefinition::new(4, "state", "status", "http"),
        MetricDefinition::new(5, "missing", "status", "http"),
        MetricDefinition::new(6, "unmapped", "status", "http"),
    ];
    let mappings = vec![
        MetricProtocolMapping::new(1, "http", "/cpu/usage"),
        MetricProtocolMapping::new(2, "http", "memory.used_bytes")
            .with_expression("value / 1024 / 1024"),
        MetricProtocolMapping::new(3, "http", "/disks/0/usage"),
        MetricProtocolMapping::new(4, "http", "/state"),
        MetricProtocolMapping::new(5, "http", "/nope"),
    ];

    CollectionContext {
        task_id: 1,
        instance_id: 10,
        asset: asset(1, "server"),
        metrics,
        protocol_mappings: mappings.into_iter().map(|m| (m.metric_id, m)).collect(),
        connection_params,
        variables: HashMap::new(),
    }
}

#[tokio::test]
async fn test_collects_json_metrics_with_isolation() {
    let base = start_server().await;
    let collector = HttpJsonCollector::new();
    let mut ctx = context(params(&[
        ("url", json!(format!("{base}/status"))),
        ("headers", json!({"x-token": "secret"})),
    ]));

    let result = collector.collect(&mut ctx).await.unwrap();

    assert!(result.success);
    assert_eq!(result.success_count, 3);
    assert_eq!(result.fail_count, 3);
    assert_eq!(result.metric_errors.len(), 3);
    assert!(result.metric_errors.contains_key(&4));
    assert!(result.metric_errors[&5].contains("/nope"));
    assert!(result.metric_errors[&6].contains("没有配置协议映射"));

    let values: Vec<f64> = result.metric_data.iter().map(|d| d.value).collect();
    assert_eq!(values, vec![37.5, 1.0, 81.0]);
    assert_eq!(result.ext_info.get("http_status"), Some(&json!(200)));
}

#[tokio::test]
async fn test_http_error_status_is_transient() {
    let base = start_server().await;
    let collector = HttpJsonCollector::new();
    // 缺少认证头
    let mut ctx = context(params(&[("url", json!(format!("{base}/status")))]));

    let err = collector.collect(&mut ctx).await.unwrap_err();
    assert!(matches!(err, SchedulerError::TransientIo(_)));
    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn test_non_json_body_fails_collection() {
    let base = start_server().await;
    let collector = HttpJsonCollector::new();
    let mut ctx = context(params(&[("url", json!(format!("{base}/text")))]));

    let result = collector.collect(&mut ctx).await.unwrap();
    assert!(!result.success);
    assert!(result.error_message.unwrap().contains("JSON"));
}

#[tokio::test]
async fn test_connection_refused() {
    let collector = HttpJsonCollector::new();
    let mut ctx = context(params(&[
        ("url", json!("http://127.0.0.1:1/status")),
        ("timeout_seconds", json!(2)),
    ]));

    let err = collector.collect(&mut ctx).await.unwrap_err();
    assert!(err.kind().is_retryable());
}

#[tokio::test]
async fn test_connection_reports_status_and_latency() {
    let base = start_server().await;
    let collector = HttpJsonCollector::new();

    let ok = collector
        .test_connection(
            "server",
            &params(&[
                ("url", json!(format!("{base}/status"))),
                ("headers", json!({"x-token": "secret"})),
            ]),
        )
        .await;
    assert!(ok.success);
    assert_eq!(ok.details.get("status"), Some(&json!(200)));
    assert!(ok.latency_ms.is_some());

    let denied = collector
        .test_connection("server", &params(&[("url", json!(format!("{base}/status")))]))
        .await;
    assert!(!denied.success);
    assert_eq!(denied.details.get("status"), Some(&json!(401)));

    let invalid = collector.test_connection("server", &params(&[])).await;
    assert!(!invalid.success);
}
