pub mod sqlite_instance_repository;
pub mod sqlite_metric_catalog_repository;
pub mod sqlite_rule_repository;
pub mod sqlite_schedule_repository;
pub mod sqlite_task_repository;

pub use sqlite_instance_repository::SqliteInstanceRepository;
pub use sqlite_metric_catalog_repository::SqliteMetricCatalogRepository;
pub use sqlite_rule_repository::SqliteRuleRepository;
pub use sqlite_schedule_repository::SqliteScheduleRepository;
pub use sqlite_task_repository::SqliteTaskRepository;

use collector_core::{SchedulerError, SchedulerResult};

/// SQLite 以文本保存 JSON 字段
pub(crate) fn parse_json_column<T: serde::de::DeserializeOwned>(
    raw: &str,
    column: &str,
) -> SchedulerResult<T> {
    serde_json::from_str(raw)
        .map_err(|e| SchedulerError::Serialization(format!("解析字段 {column} 失败: {e}")))
}

/// 唯一约束冲突
pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}
