use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use collector_core::models::{ScheduleType, TaskSchedule};

use crate::{
    error::ApiResult,
    response::{created, success, success_message},
    routes::AppState,
};

/// 调度创建和更新请求
#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub name: String,
    pub task_id: i64,
    pub schedule_type: ScheduleType,
    pub fixed_rate_seconds: Option<i64>,
    pub cron_expression: Option<String>,
    pub execute_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub max_retries: Option<i32>,
    pub retry_interval_seconds: Option<i32>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ScheduleRequest {
    pub fn into_schedule(self) -> TaskSchedule {
        let mut schedule = TaskSchedule::fixed_rate(self.name, self.task_id, 0);
        schedule.schedule_type = self.schedule_type;
        schedule.fixed_rate_seconds = self.fixed_rate_seconds;
        schedule.cron_expression = self.cron_expression;
        schedule.execute_time = self.execute_time;
        schedule.start_time = self.start_time;
        schedule.end_time = self.end_time;
        if let Some(max_retries) = self.max_retries {
            schedule.max_retries = max_retries;
        }
        if let Some(interval) = self.retry_interval_seconds {
            schedule.retry_interval_seconds = interval;
        }
        schedule.enabled = self.enabled;
        schedule
    }
}

#[derive(Debug, Deserialize)]
pub struct ScheduleQueryParams {
    pub task_id: Option<i64>,
}

pub async fn list_schedules(
    State(state): State<AppState>,
    Query(params): Query<ScheduleQueryParams>,
) -> ApiResult<impl IntoResponse> {
    let schedules = state.admin.list_schedules(params.task_id).await?;
    Ok(success(schedules))
}

pub async fn create_schedule(
    State(state): State<AppState>,
    Json(request): Json<ScheduleRequest>,
) -> ApiResult<impl IntoResponse> {
    let schedule = state.admin.create_schedule(request.into_schedule()).await?;
    Ok(created(schedule))
}

pub async fn get_schedule(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.admin.get_schedule(id).await?))
}

pub async fn update_schedule(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<ScheduleRequest>,
) -> ApiResult<impl IntoResponse> {
    let schedule = state
        .admin
        .update_schedule(id, request.into_schedule())
        .await?;
    Ok(success(schedule))
}

pub async fn delete_schedule(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state.admin.delete_schedule(id).await?;
    Ok(success_message("调度已删除"))
}

pub async fn enable_schedule(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.admin.enable_schedule(id).await?))
}

pub async fn disable_schedule(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.admin.disable_schedule(id).await?))
}

/// 立即执行调度对应的任务，采集完成后返回实例ID
pub async fn execute_schedule(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let instance_id = state.admin.execute_schedule_now(id).await?;
    Ok(success(json!({ "instance_id": instance_id })))
}
