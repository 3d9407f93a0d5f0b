//! # Collector API
//!
//! 采集调度服务的管理接口，基于 Axum 构建。
//!
//! ## API 端点
//!
//! ### 任务调度
//! - `GET /api/schedules?task_id=` - 调度列表，可按任务过滤
//! - `POST /api/schedules` - 创建调度
//! - `GET /api/schedules/{id}` - 调度详情
//! - `POST /api/schedules/{id}/update|delete|enable|disable|execute`
//!
//! ### 采集规则
//! - `GET /api/rules`、`POST /api/rules`、`GET /api/rules/{id}`
//! - `POST /api/rules/{id}/update|delete|enable|disable|execute`
//!
//! ### 任务与实例
//! - `POST /api/tasks/{id}/execute` - 立即执行任务
//! - `GET /api/tasks/{id}/instances?limit=` - 最近的采集实例
//! - `GET /api/instances/{id}` - 实例详情
//!
//! ### 采集器
//! - `GET /api/collectors` - 已注册的采集器
//! - `POST /api/collectors/test-connection` - 测试连接
//!
//! 所有响应使用统一的 `{success, data, message, timestamp}` 结构。
//! "立即执行"类接口同步等待采集完成后返回实例ID。

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

pub use error::{ApiError, ApiResult};
pub use response::ApiResponse;
pub use routes::{create_app, create_routes, AppState};
