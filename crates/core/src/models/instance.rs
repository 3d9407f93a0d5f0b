use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::sqlite_text_enum;
use crate::{SchedulerError, SchedulerResult};

/// 一次采集执行记录
///
/// 由执行协调器在派发时创建，状态只允许从 `Running` 转换到
/// `Success` 或 `Fail` 一次，设置 `end_time` 后不再修改。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInstance {
    pub id: i64,
    pub task_id: i64,
    pub schedule_id: Option<i64>,
    pub rule_id: Option<i64>,
    pub trigger_source: TriggerSource,
    pub asset_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: InstanceStatus,
    pub error_message: Option<String>,
    pub data_point_count: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum InstanceStatus {
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAIL")]
    Fail,
}

sqlite_text_enum!(InstanceStatus {
    Running => "RUNNING",
    Success => "SUCCESS",
    Fail => "FAIL",
});

/// 触发来源
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TriggerSource {
    #[serde(rename = "MANUAL")]
    Manual,
    #[serde(rename = "FIXED_RATE")]
    FixedRate,
    #[serde(rename = "CRON")]
    Cron,
    #[serde(rename = "ONE_SHOT")]
    OneShot,
    #[serde(rename = "RULE")]
    Rule,
    #[serde(rename = "INTERVAL")]
    Interval,
}

sqlite_text_enum!(TriggerSource {
    Manual => "MANUAL",
    FixedRate => "FIXED_RATE",
    Cron => "CRON",
    OneShot => "ONE_SHOT",
    Rule => "RULE",
    Interval => "INTERVAL",
});

/// 一次执行的触发上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub source: TriggerSource,
    pub schedule_id: Option<i64>,
    pub rule_id: Option<i64>,
}

impl Trigger {
    pub fn manual() -> Self {
        Self {
            source: TriggerSource::Manual,
            schedule_id: None,
            rule_id: None,
        }
    }

    pub fn schedule(source: TriggerSource, schedule_id: i64) -> Self {
        Self {
            source,
            schedule_id: Some(schedule_id),
            rule_id: None,
        }
    }

    pub fn rule(rule_id: i64) -> Self {
        Self {
            source: TriggerSource::Rule,
            schedule_id: None,
            rule_id: Some(rule_id),
        }
    }

    pub fn interval() -> Self {
        Self {
            source: TriggerSource::Interval,
            schedule_id: None,
            rule_id: None,
        }
    }

    /// 由调度器驱动的触发
    pub fn is_scheduled(&self) -> bool {
        !matches!(self.source, TriggerSource::Manual)
    }
}

impl TaskInstance {
    pub fn start(task_id: i64, asset_id: i64, trigger: &Trigger, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            task_id,
            schedule_id: trigger.schedule_id,
            rule_id: trigger.rule_id,
            trigger_source: trigger.source,
            asset_id,
            start_time: now,
            end_time: None,
            status: InstanceStatus::Running,
            error_message: None,
            data_point_count: 0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    /// 结束实例，已结束的实例再次结束会返回错误且保持原状
    pub fn finish(&mut self, outcome: &InstanceOutcome) -> SchedulerResult<()> {
        if self.is_finished() {
            return Err(SchedulerError::InstanceAlreadyFinished { id: self.id });
        }
        self.status = outcome.status;
        self.end_time = Some(outcome.end_time);
        self.error_message = outcome.error_message.clone();
        self.data_point_count = outcome.data_point_count;
        Ok(())
    }
}

/// 实例的最终结果
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceOutcome {
    pub status: InstanceStatus,
    pub end_time: DateTime<Utc>,
    pub error_message: Option<String>,
    pub data_point_count: i64,
}

impl InstanceOutcome {
    pub fn success(end_time: DateTime<Utc>, data_point_count: i64) -> Self {
        Self {
            status: InstanceStatus::Success,
            end_time,
            error_message: None,
            data_point_count,
        }
    }

    pub fn failure(end_time: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            status: InstanceStatus::Fail,
            end_time,
            error_message: Some(message.into()),
            data_point_count: 0,
        }
    }
}
