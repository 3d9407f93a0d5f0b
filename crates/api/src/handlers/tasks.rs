use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use collector_core::SchedulerError;

use crate::{
    error::{ApiError, ApiResult},
    response::success,
    routes::AppState,
};

const DEFAULT_INSTANCE_LIMIT: i64 = 20;
const MAX_INSTANCE_LIMIT: i64 = 500;

/// 实例查询参数
#[derive(Debug, Deserialize)]
pub struct InstanceQueryParams {
    pub limit: Option<i64>,
}

/// 立即执行任务
pub async fn execute_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let instance_id = state.admin.execute_task_now(id).await?;
    Ok(success(json!({ "instance_id": instance_id })))
}

/// 获取任务最近的采集实例，按开始时间倒序
pub async fn list_task_instances(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
    Query(params): Query<InstanceQueryParams>,
) -> ApiResult<impl IntoResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_INSTANCE_LIMIT);
    if !(1..=MAX_INSTANCE_LIMIT).contains(&limit) {
        return Err(ApiError::BadRequest(format!(
            "limit 必须在 1 到 {MAX_INSTANCE_LIMIT} 之间"
        )));
    }

    let instances = state.instance_repo.list_by_task(task_id, limit).await?;
    Ok(success(instances))
}

/// 获取单个采集实例
pub async fn get_instance(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let instance = state
        .instance_repo
        .get_by_id(id)
        .await?
        .ok_or(SchedulerError::InstanceNotFound { id })?;
    Ok(success(instance))
}
