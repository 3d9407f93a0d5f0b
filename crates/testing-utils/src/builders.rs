//! Test data builders for creating test entities
//!
//! This module provides builder patterns for creating test data with
//! sensible defaults and easy customization.

use chrono::{DateTime, Utc};
use collector_core::models::{
    AssetInfo, CollectorRule, CollectorTask, ConnectionParams, RuleType, TaskSchedule,
    TaskStatus,
};
use std::collections::HashMap;

/// Builder for creating test CollectorTask entities
pub struct TaskBuilder {
    task: CollectorTask,
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self {
            task: {
                let mut task = CollectorTask::new("test_task", "test_task", "server", "http", 1);
                task.id = 1;
                task.metrics = serde_json::json!([1]);
                task
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.task.id = id;
        self
    }

    pub fn with_code(mut self, code: &str) -> Self {
        self.task.code = code.to_string();
        self.task.name = code.to_string();
        self
    }

    /// 任务的资产类型，参与采集器匹配
    pub fn with_task_type(mut self, task_type: &str) -> Self {
        self.task.task_type = task_type.to_string();
        self
    }

    pub fn with_protocol(mut self, protocol: &str) -> Self {
        self.task.protocol = protocol.to_string();
        self
    }

    pub fn with_asset(mut self, asset_id: i64) -> Self {
        self.task.asset_id = asset_id;
        self
    }

    pub fn with_metrics(mut self, metrics: serde_json::Value) -> Self {
        self.task.metrics = metrics;
        self
    }

    pub fn with_connection_params(mut self, params: serde_json::Value) -> Self {
        self.task.connection_params = params;
        self
    }

    pub fn with_interval(mut self, interval_seconds: i64) -> Self {
        self.task.interval_seconds = interval_seconds;
        self
    }

    pub fn with_last_execute_time(mut self, at: DateTime<Utc>) -> Self {
        self.task.last_execute_time = Some(at);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.task.status = TaskStatus::Disabled;
        self
    }

    pub fn build(self) -> CollectorTask {
        self.task
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test TaskSchedule entities
pub struct ScheduleBuilder {
    schedule: TaskSchedule,
}

impl ScheduleBuilder {
    pub fn fixed_rate(task_id: i64, rate_seconds: i64) -> Self {
        Self {
            schedule: TaskSchedule::fixed_rate("test_fixed_rate", task_id, rate_seconds),
        }
    }

    pub fn cron(task_id: i64, expression: &str) -> Self {
        Self {
            schedule: TaskSchedule::cron("test_cron", task_id, expression),
        }
    }

    pub fn one_shot(task_id: i64, execute_time: DateTime<Utc>) -> Self {
        Self {
            schedule: TaskSchedule::one_shot("test_one_shot", task_id, execute_time),
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.schedule.id = id;
        self
    }

    pub fn with_window(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.schedule.start_time = start;
        self.schedule.end_time = end;
        self
    }

    pub fn with_last_execute_time(mut self, at: DateTime<Utc>) -> Self {
        self.schedule.last_execute_time = Some(at);
        self
    }

    pub fn with_next_execute_time(mut self, at: DateTime<Utc>) -> Self {
        self.schedule.next_execute_time = Some(at);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.schedule.enabled = false;
        self
    }

    pub fn build(self) -> TaskSchedule {
        self.schedule
    }
}

/// 采集规则
pub fn rule(rule_type: RuleType, expression: &str, task_ids: Vec<i64>) -> CollectorRule {
    CollectorRule::new("test_rule", rule_type, expression, task_ids)
}

/// 测试资产
pub fn asset(id: i64, asset_type: &str) -> AssetInfo {
    AssetInfo {
        id,
        name: format!("asset-{id}"),
        ip: Some(format!("10.0.0.{id}")),
        asset_type: asset_type.to_string(),
        attributes: HashMap::new(),
    }
}

/// 由键值对构造连接参数
pub fn params(pairs: &[(&str, serde_json::Value)]) -> ConnectionParams {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}
