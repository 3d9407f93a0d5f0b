use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;

use collector_core::models::ConnectionParams;

use crate::{error::ApiResult, response::success, routes::AppState};

/// 连接测试请求
#[derive(Debug, Deserialize)]
pub struct TestConnectionRequest {
    pub protocol: String,
    pub asset_type: String,
    #[serde(default)]
    pub connection_params: ConnectionParams,
}

pub async fn list_collectors(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.coordinator.registry().list().await))
}

/// 连接测试失败通过结果中的 `success` 字段表达，接口本身总是成功返回
pub async fn test_connection(
    State(state): State<AppState>,
    Json(request): Json<TestConnectionRequest>,
) -> ApiResult<impl IntoResponse> {
    let result = state
        .coordinator
        .test_connection(
            &request.protocol,
            &request.asset_type,
            &request.connection_params,
        )
        .await;
    Ok(success(result))
}
