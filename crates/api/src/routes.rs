use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use collector_core::config::ApiConfig;
use collector_core::traits::InstanceRepository;
use collector_dispatcher::ScheduleAdminService;
use collector_worker::ExecutionCoordinator;

use crate::handlers::{
    collectors::{list_collectors, test_connection},
    health::health_check,
    rules::{
        create_rule, delete_rule, disable_rule, enable_rule, execute_rule, get_rule, list_rules,
        update_rule,
    },
    schedules::{
        create_schedule, delete_schedule, disable_schedule, enable_schedule, execute_schedule,
        get_schedule, list_schedules, update_schedule,
    },
    tasks::{execute_task, get_instance, list_task_instances},
};
use crate::middleware::{cors_layer, request_logging, trace_layer};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub admin: Arc<ScheduleAdminService>,
    pub instance_repo: Arc<dyn InstanceRepository>,
    pub coordinator: Arc<ExecutionCoordinator>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // 任务调度
        .route("/api/schedules", get(list_schedules).post(create_schedule))
        .route("/api/schedules/{id}", get(get_schedule))
        .route("/api/schedules/{id}/update", post(update_schedule))
        .route("/api/schedules/{id}/delete", post(delete_schedule))
        .route("/api/schedules/{id}/enable", post(enable_schedule))
        .route("/api/schedules/{id}/disable", post(disable_schedule))
        .route("/api/schedules/{id}/execute", post(execute_schedule))
        // 采集规则
        .route("/api/rules", get(list_rules).post(create_rule))
        .route("/api/rules/{id}", get(get_rule))
        .route("/api/rules/{id}/update", post(update_rule))
        .route("/api/rules/{id}/delete", post(delete_rule))
        .route("/api/rules/{id}/enable", post(enable_rule))
        .route("/api/rules/{id}/disable", post(disable_rule))
        .route("/api/rules/{id}/execute", post(execute_rule))
        // 任务与实例
        .route("/api/tasks/{id}/execute", post(execute_task))
        .route("/api/tasks/{id}/instances", get(list_task_instances))
        .route("/api/instances/{id}", get(get_instance))
        // 采集器
        .route("/api/collectors", get(list_collectors))
        .route("/api/collectors/test-connection", post(test_connection))
        .layer(middleware::from_fn(request_logging))
        .layer(trace_layer())
        .with_state(state)
}

/// 按API配置组装应用，开启跨域时附加CORS层
pub fn create_app(state: AppState, config: &ApiConfig) -> Router {
    let app = create_routes(state);
    if config.cors_enabled {
        app.layer(cors_layer())
    } else {
        app
    }
}
