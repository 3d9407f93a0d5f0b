use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use collector_core::models::{CollectorRule, RuleType};

use crate::{
    error::ApiResult,
    response::{created, success, success_message},
    routes::AppState,
};

/// 规则创建和更新请求
#[derive(Debug, Deserialize)]
pub struct RuleRequest {
    pub name: String,
    pub rule_type: RuleType,
    pub expression: String,
    pub task_ids: Vec<i64>,
    pub description: Option<String>,
    pub timeout_seconds: Option<i32>,
    pub retry_count: Option<i32>,
    pub retry_interval_seconds: Option<i32>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl RuleRequest {
    pub fn into_rule(self) -> CollectorRule {
        let mut rule = CollectorRule::new(self.name, self.rule_type, self.expression, self.task_ids);
        rule.description = self.description;
        if let Some(timeout) = self.timeout_seconds {
            rule.timeout_seconds = timeout;
        }
        if let Some(count) = self.retry_count {
            rule.retry_count = count;
        }
        if let Some(interval) = self.retry_interval_seconds {
            rule.retry_interval_seconds = interval;
        }
        rule.enabled = self.enabled;
        rule
    }
}

pub async fn list_rules(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.admin.list_rules().await?))
}

pub async fn create_rule(
    State(state): State<AppState>,
    Json(request): Json<RuleRequest>,
) -> ApiResult<impl IntoResponse> {
    let rule = state.admin.create_rule(request.into_rule()).await?;
    Ok(created(rule))
}

pub async fn get_rule(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.admin.get_rule(id).await?))
}

pub async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<RuleRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.admin.update_rule(id, request.into_rule()).await?))
}

pub async fn delete_rule(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state.admin.delete_rule(id).await?;
    Ok(success_message("规则已删除"))
}

pub async fn enable_rule(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.admin.enable_rule(id).await?))
}

pub async fn disable_rule(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.admin.disable_rule(id).await?))
}

/// 依次执行规则的成员任务，返回成功创建的实例ID
pub async fn execute_rule(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let instance_ids = state.admin.execute_rule_now(id).await?;
    Ok(success(json!({ "instance_ids": instance_ids })))
}
