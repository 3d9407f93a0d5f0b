use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Duration;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use collector_api::{create_app, create_routes, AppState};
use collector_core::config::ApiConfig;
use collector_core::models::{MetricDefinition, MetricProtocolMapping};
use collector_core::CollectorRegistry;
use collector_dispatcher::{ScheduleAdminService, TriggerEvaluator};
use collector_testing_utils::{
    asset, params, MockAssetService, MockInstanceRepository, MockMetricCatalogRepository,
    MockRuleRepository, MockScheduleRepository, MockTaskRepository, RecordingMetricSink,
    StaticValueCollector, TaskBuilder,
};
use collector_worker::ExecutionCoordinator;

async fn state() -> AppState {
    let registry = Arc::new(CollectorRegistry::new());
    registry
        .register(Arc::new(
            StaticValueCollector::new("static", "http", &["server"]).with_value("cpu", json!(3.5)),
        ))
        .await;

    let tasks = Arc::new(MockTaskRepository::with_tasks(vec![
        TaskBuilder::new().with_id(1).with_code("web_cpu").build(),
        TaskBuilder::new()
            .with_id(2)
            .with_code("printer_ink")
            .with_protocol("snmp")
            .with_task_type("printer")
            .build(),
    ]));
    let instances = Arc::new(MockInstanceRepository::new());
    let coordinator = Arc::new(ExecutionCoordinator::new(
        registry,
        tasks.clone(),
        instances.clone(),
        Arc::new(MockMetricCatalogRepository::new().with_metric(
            MetricDefinition::new(1, "cpu_usage", "cpu", "http"),
            MetricProtocolMapping::new(1, "http", "cpu"),
        )),
        Arc::new(
            MockAssetService::new()
                .with_asset(asset(1, "server"), params(&[("url", json!("http://10.0.0.1"))])),
        ),
        Arc::new(RecordingMetricSink::new()),
    ));

    let admin = Arc::new(ScheduleAdminService::new(
        tasks,
        Arc::new(MockScheduleRepository::new()),
        Arc::new(MockRuleRepository::new()),
        coordinator.clone(),
        Arc::new(TriggerEvaluator::new(Duration::hours(1))),
    ));

    AppState {
        admin,
        instance_repo: instances,
        coordinator,
    }
}

async fn app() -> Router {
    create_routes(state().await)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn fixed_rate(task_id: i64, rate: i64) -> Value {
    json!({
        "name": "every_minute",
        "task_id": task_id,
        "schedule_type": "FIXED_RATE",
        "fixed_rate_seconds": rate
    })
}

#[tokio::test]
async fn test_health_check() {
    let app = app().await;
    let (status, body) = call(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ok");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_cors_follows_api_config() {
    let request = || {
        Request::builder()
            .uri("/health")
            .header("origin", "http://console.local")
            .body(Body::empty())
            .unwrap()
    };

    let enabled = create_app(state().await, &ApiConfig::default());
    let response = enabled.oneshot(request()).await.unwrap();
    assert!(response
        .headers()
        .contains_key("access-control-allow-origin"));

    let config = ApiConfig {
        cors_enabled: false,
        ..ApiConfig::default()
    };
    let disabled = create_app(state().await, &config);
    let response = disabled.oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!response
        .headers()
        .contains_key("access-control-allow-origin"));
}

#[tokio::test]
async fn test_schedule_lifecycle() {
    let app = app().await;

    let (status, body) = call(&app, "POST", "/api/schedules", Some(fixed_rate(1, 60))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    let id = body["data"]["id"].as_i64().unwrap();
    assert!(body["data"]["next_execute_time"].is_string());

    let (status, body) = call(&app, "GET", &format!("/api/schedules/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["schedule_type"], "FIXED_RATE");

    let (_, body) = call(&app, "GET", "/api/schedules?task_id=1", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    let (_, body) = call(&app, "GET", "/api/schedules?task_id=2", None).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let mut changed = fixed_rate(1, 300);
    changed["name"] = json!("every_five_minutes");
    let (status, body) = call(
        &app,
        "POST",
        &format!("/api/schedules/{id}/update"),
        Some(changed),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["fixed_rate_seconds"], 300);

    let (_, body) = call(&app, "POST", &format!("/api/schedules/{id}/disable"), None).await;
    assert_eq!(body["data"]["enabled"], false);
    assert!(body["data"]["next_execute_time"].is_null());

    let (_, body) = call(&app, "POST", &format!("/api/schedules/{id}/enable"), None).await;
    assert_eq!(body["data"]["enabled"], true);

    let (status, _) = call(&app, "POST", &format!("/api/schedules/{id}/delete"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, "GET", &format!("/api/schedules/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains(&id.to_string()));
}

#[tokio::test]
async fn test_schedule_validation_errors() {
    let app = app().await;

    let (status, body) = call(&app, "POST", "/api/schedules", Some(fixed_rate(1, 0))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let cron = json!({
        "name": "bad_cron",
        "task_id": 1,
        "schedule_type": "CRON",
        "cron_expression": "whenever"
    });
    let (status, _) = call(&app, "POST", "/api/schedules", Some(cron)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, "POST", "/api/schedules", Some(fixed_rate(99, 60))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_oversized_periods_are_rejected() {
    let app = app().await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/schedules",
        Some(fixed_rate(1, 10_000_000_000_000)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let rule = json!({
        "name": "too_sparse",
        "rule_type": "interval",
        "expression": "10000000000000",
        "task_ids": [1]
    });
    let (status, body) = call(&app, "POST", "/api/rules", Some(rule)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    // 服务仍然可用
    let (status, _) = call(&app, "POST", "/api/schedules", Some(fixed_rate(1, 60))).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_execute_schedule_and_read_instances() {
    let app = app().await;
    let (_, body) = call(&app, "POST", "/api/schedules", Some(fixed_rate(1, 60))).await;
    let id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = call(&app, "POST", &format!("/api/schedules/{id}/execute"), None).await;
    assert_eq!(status, StatusCode::OK);
    let instance_id = body["data"]["instance_id"].as_i64().unwrap();

    let (status, body) = call(&app, "GET", &format!("/api/instances/{instance_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "SUCCESS");
    assert_eq!(body["data"]["trigger_source"], "MANUAL");
    assert_eq!(body["data"]["schedule_id"], id);
    assert_eq!(body["data"]["data_point_count"], 1);

    call(&app, "POST", "/api/tasks/1/execute", None).await;
    let (_, body) = call(&app, "GET", "/api/tasks/1/instances?limit=1", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    let (_, body) = call(&app, "GET", "/api/tasks/1/instances", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, _) = call(&app, "GET", "/api/tasks/1/instances?limit=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, "GET", "/api/instances/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_execute_task_without_collector_records_failure() {
    let app = app().await;

    let (status, body) = call(&app, "POST", "/api/tasks/2/execute", None).await;
    assert_eq!(status, StatusCode::OK);
    let instance_id = body["data"]["instance_id"].as_i64().unwrap();

    let (_, body) = call(&app, "GET", &format!("/api/instances/{instance_id}"), None).await;
    assert_eq!(body["data"]["status"], "FAIL");
    assert!(body["data"]["error_message"]
        .as_str()
        .unwrap()
        .starts_with("[配置错误]"));

    let (status, _) = call(&app, "POST", "/api/tasks/99/execute", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rule_endpoints() {
    let app = app().await;

    let rule = json!({
        "name": "hourly_inventory",
        "rule_type": "interval",
        "expression": "3600",
        "task_ids": [1, 2]
    });
    let (status, body) = call(&app, "POST", "/api/rules", Some(rule)).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["id"].as_i64().unwrap();

    let (_, body) = call(&app, "GET", "/api/rules", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = call(&app, "POST", &format!("/api/rules/{id}/execute"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["instance_ids"].as_array().unwrap().len(), 2);

    let (_, body) = call(&app, "POST", &format!("/api/rules/{id}/disable"), None).await;
    assert_eq!(body["data"]["enabled"], false);

    let bad = json!({
        "name": "bad",
        "rule_type": "fixedTime",
        "expression": "noon",
        "task_ids": [1]
    });
    let (status, _) = call(&app, "POST", &format!("/api/rules/{id}/update"), Some(bad)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    call(&app, "POST", &format!("/api/rules/{id}/delete"), None).await;
    let (status, _) = call(&app, "GET", &format!("/api/rules/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_collector_endpoints() {
    let app = app().await;

    let (_, body) = call(&app, "GET", "/api/collectors", None).await;
    let collectors = body["data"].as_array().unwrap();
    assert_eq!(collectors.len(), 1);
    assert_eq!(collectors[0]["name"], "static");

    let request = json!({
        "protocol": "HTTP",
        "asset_type": "server",
        "connection_params": {"url": "http://10.0.0.1"}
    });
    let (status, body) = call(&app, "POST", "/api/collectors/test-connection", Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["success"], true);

    let request = json!({"protocol": "snmp", "asset_type": "printer"});
    let (status, body) = call(&app, "POST", "/api/collectors/test-connection", Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["success"], false);
}
