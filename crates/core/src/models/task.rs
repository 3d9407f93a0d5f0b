use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{checked_offset, sqlite_text_enum, InstanceStatus};
use crate::{SchedulerError, SchedulerResult};

/// 采集任务
///
/// 绑定一个资产、一个采集协议和一组指标的周期性采集配置。
/// 任务由外部管理端维护，调度器只会修改 `last_execute_time` 和
/// `last_execute_status` 两个字段。
///
/// # 字段说明
///
/// - `code`: 全局唯一的任务编码
/// - `task_type`: 资产类型，如 "server"、"database"、"middleware"、"application"
/// - `protocol`: 采集协议，如 "snmp"、"jdbc"、"http"
/// - `interval_seconds`: 采集间隔（秒）
/// - `metrics`: 指标配置，支持 `[1,2,3]` 或 `[{"id":1}]` 两种格式
/// - `connection_params`: 连接参数，会覆盖资产服务提供的同名参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorTask {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub task_type: String,
    pub protocol: String,
    pub asset_id: i64,
    pub interval_seconds: i64,
    pub metrics: serde_json::Value,
    pub connection_params: serde_json::Value,
    pub status: TaskStatus,
    pub description: Option<String>,
    pub last_execute_time: Option<DateTime<Utc>>,
    pub last_execute_status: Option<InstanceStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskStatus {
    #[serde(rename = "ENABLED")]
    Enabled,
    #[serde(rename = "DISABLED")]
    Disabled,
}

sqlite_text_enum!(TaskStatus {
    Enabled => "ENABLED",
    Disabled => "DISABLED",
});

impl CollectorTask {
    pub fn new(
        name: impl Into<String>,
        code: impl Into<String>,
        task_type: impl Into<String>,
        protocol: impl Into<String>,
        asset_id: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: name.into(),
            code: code.into(),
            task_type: task_type.into(),
            protocol: protocol.into(),
            asset_id,
            interval_seconds: 60,
            metrics: serde_json::Value::Array(vec![]),
            connection_params: serde_json::Value::Object(serde_json::Map::new()),
            status: TaskStatus::Enabled,
            description: None,
            last_execute_time: None,
            last_execute_status: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.status, TaskStatus::Enabled)
    }

    /// 按任务自身的采集间隔判断是否到期
    ///
    /// 间隔超出时间范围的任务视为未到期，不影响同一轮扫描中的其他任务。
    pub fn is_interval_due(&self, now: DateTime<Utc>) -> bool {
        if !self.is_enabled() || self.interval_seconds <= 0 {
            return false;
        }
        let Some(last) = self.last_execute_time else {
            return true;
        };
        match checked_offset(last, self.interval_seconds) {
            Some(due_at) => now >= due_at,
            None => {
                warn!(
                    task_id = self.id,
                    interval_seconds = self.interval_seconds,
                    "采集间隔超出时间范围，跳过该任务"
                );
                false
            }
        }
    }

    /// 解析任务配置的指标ID列表
    ///
    /// 接受 `[1,2,3]`、`[{"id":1},{"id":2}]`，也接受以字符串保存的同样内容。
    pub fn metric_ids(&self) -> SchedulerResult<Vec<i64>> {
        let value = match &self.metrics {
            serde_json::Value::String(raw) => serde_json::from_str(raw).map_err(|e| {
                SchedulerError::Configuration(format!("指标配置不是有效的JSON: {e}"))
            })?,
            other => other.clone(),
        };

        let items = match value {
            serde_json::Value::Array(items) => items,
            serde_json::Value::Null => Vec::new(),
            other => {
                return Err(SchedulerError::Configuration(format!(
                    "指标配置必须是数组: {other}"
                )))
            }
        };

        items
            .iter()
            .map(|item| {
                let id = match item {
                    serde_json::Value::Object(map) => map.get("id").and_then(|v| v.as_i64()),
                    other => other.as_i64(),
                };
                id.ok_or_else(|| {
                    SchedulerError::Configuration(format!("无法解析指标ID: {item}"))
                })
            })
            .collect()
    }

    /// 任务上配置的连接参数
    pub fn connection_param_map(&self) -> serde_json::Map<String, serde_json::Value> {
        match &self.connection_params {
            serde_json::Value::Object(map) => map.clone(),
            serde_json::Value::String(raw) => serde_json::from_str(raw).unwrap_or_default(),
            _ => serde_json::Map::new(),
        }
    }

    pub fn entity_description(&self) -> String {
        format!("采集任务 '{}' (ID: {}, 编码: {})", self.name, self.id, self.code)
    }
}
