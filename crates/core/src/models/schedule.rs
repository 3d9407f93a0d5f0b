use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{checked_offset, MAX_PERIOD_SECONDS};
use crate::{SchedulerError, SchedulerResult};

/// 任务调度配置
///
/// 每条调度属于一个采集任务，根据 `schedule_type` 使用不同的触发字段：
/// 固定频率使用 `fixed_rate_seconds`，Cron 使用 `cron_expression`，
/// 一次性执行使用 `execute_time`。可选的 `[start_time, end_time]` 限定有效期。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSchedule {
    pub id: i64,
    pub name: String,
    pub task_id: i64,
    pub schedule_type: ScheduleType,
    pub fixed_rate_seconds: Option<i64>,
    pub cron_expression: Option<String>,
    pub execute_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub max_retries: i32,
    pub retry_interval_seconds: i32,
    pub enabled: bool,
    pub last_execute_time: Option<DateTime<Utc>>,
    /// Cron 调度下仅用于展示，触发判断始终根据表达式重新计算
    pub next_execute_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 调度类型，持久化为整数 1/2/3
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleType {
    FixedRate,
    Cron,
    OneShot,
}

impl ScheduleType {
    pub fn code(&self) -> i32 {
        match self {
            ScheduleType::FixedRate => 1,
            ScheduleType::Cron => 2,
            ScheduleType::OneShot => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(ScheduleType::FixedRate),
            2 => Some(ScheduleType::Cron),
            3 => Some(ScheduleType::OneShot),
            _ => None,
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for ScheduleType {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i32 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i32 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for ScheduleType {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let code = <i32 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        ScheduleType::from_code(code).ok_or_else(|| format!("Invalid schedule type: {code}").into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for ScheduleType {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <i32 as sqlx::Encode<sqlx::Sqlite>>::encode(self.code(), buf)
    }
}

impl TaskSchedule {
    fn base(name: String, task_id: i64, schedule_type: ScheduleType) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name,
            task_id,
            schedule_type,
            fixed_rate_seconds: None,
            cron_expression: None,
            execute_time: None,
            start_time: None,
            end_time: None,
            max_retries: 0,
            retry_interval_seconds: 60,
            enabled: true,
            last_execute_time: None,
            next_execute_time: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn fixed_rate(name: impl Into<String>, task_id: i64, rate_seconds: i64) -> Self {
        let mut schedule = Self::base(name.into(), task_id, ScheduleType::FixedRate);
        schedule.fixed_rate_seconds = Some(rate_seconds);
        schedule
    }

    pub fn cron(name: impl Into<String>, task_id: i64, expression: impl Into<String>) -> Self {
        let mut schedule = Self::base(name.into(), task_id, ScheduleType::Cron);
        schedule.cron_expression = Some(expression.into());
        schedule
    }

    pub fn one_shot(name: impl Into<String>, task_id: i64, execute_time: DateTime<Utc>) -> Self {
        let mut schedule = Self::base(name.into(), task_id, ScheduleType::OneShot);
        schedule.execute_time = Some(execute_time);
        schedule
    }

    /// 当前时间是否处于有效期内，边界包含在内
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        let after_start = self.start_time.map_or(true, |start| now >= start);
        let before_end = self.end_time.map_or(true, |end| now <= end);
        after_start && before_end
    }

    /// 固定频率调度是否到期：从未执行过或已到达下次执行时间，且处于有效期内
    pub fn is_fixed_rate_due(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled || self.schedule_type != ScheduleType::FixedRate {
            return false;
        }
        if !self.is_within_window(now) {
            return false;
        }
        match (self.last_execute_time, self.next_execute_time) {
            (None, _) => true,
            (Some(_), Some(next)) => now >= next,
            (Some(last), None) => {
                let Some(rate) = self.fixed_rate_seconds else {
                    return false;
                };
                match checked_offset(last, rate) {
                    Some(due_at) => now >= due_at,
                    None => {
                        warn!(
                            schedule_id = self.id,
                            fixed_rate_seconds = rate,
                            "执行频率超出时间范围，跳过该调度"
                        );
                        false
                    }
                }
            }
        }
    }

    /// 一次性调度是否到期：到达执行时间且从未执行过
    pub fn is_one_shot_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled
            && self.schedule_type == ScheduleType::OneShot
            && self.last_execute_time.is_none()
            && self.execute_time.map_or(false, |at| now >= at)
    }

    /// 固定频率调度触发后的下次执行时间
    pub fn next_fixed_rate_time(
        &self,
        fired_at: DateTime<Utc>,
    ) -> SchedulerResult<Option<DateTime<Utc>>> {
        let Some(rate) = self.fixed_rate_seconds else {
            return Ok(None);
        };
        checked_offset(fired_at, rate).map(Some).ok_or_else(|| {
            SchedulerError::InvalidSchedule(format!("执行频率超出时间范围: {rate}秒"))
        })
    }

    /// 按有效期裁剪下次执行时间：早于开始时间取开始时间，晚于结束时间则不再执行
    pub fn clamp_to_window(&self, next: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        let next = next?;
        let next = match self.start_time {
            Some(start) if next < start => start,
            _ => next,
        };
        match self.end_time {
            Some(end) if next > end => None,
            _ => Some(next),
        }
    }

    /// 校验与调度类型对应的字段，Cron 表达式的语法由调度模块校验
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.name.trim().is_empty() {
            return Err(SchedulerError::InvalidSchedule("调度名称不能为空".to_string()));
        }
        match self.schedule_type {
            ScheduleType::FixedRate => match self.fixed_rate_seconds {
                Some(rate) if rate > MAX_PERIOD_SECONDS => {
                    return Err(SchedulerError::InvalidSchedule(format!(
                        "固定频率调度的执行频率不能超过{MAX_PERIOD_SECONDS}秒"
                    )))
                }
                Some(rate) if rate > 0 => {}
                _ => {
                    return Err(SchedulerError::InvalidSchedule(
                        "固定频率调度的执行频率必须大于0".to_string(),
                    ))
                }
            },
            ScheduleType::Cron => {
                if self
                    .cron_expression
                    .as_deref()
                    .map_or(true, |expr| expr.trim().is_empty())
                {
                    return Err(SchedulerError::InvalidSchedule(
                        "Cron调度必须配置Cron表达式".to_string(),
                    ));
                }
            }
            ScheduleType::OneShot => {
                if self.execute_time.is_none() {
                    return Err(SchedulerError::InvalidSchedule(
                        "一次性调度必须配置执行时间".to_string(),
                    ));
                }
            }
        }
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if start > end {
                return Err(SchedulerError::InvalidSchedule(
                    "有效期开始时间不能晚于结束时间".to_string(),
                ));
            }
        }
        if self.max_retries < 0 || self.retry_interval_seconds < 0 {
            return Err(SchedulerError::InvalidSchedule(
                "重试次数和重试间隔不能为负数".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_fixed_rate_due() {
        let mut schedule = TaskSchedule::fixed_rate("每30秒", 1, 30);
        assert!(schedule.is_fixed_rate_due(at(10, 0, 0)));

        schedule.last_execute_time = Some(at(10, 0, 0));
        schedule.next_execute_time = schedule.next_fixed_rate_time(at(10, 0, 0)).unwrap();
        assert!(!schedule.is_fixed_rate_due(at(10, 0, 29)));
        assert!(schedule.is_fixed_rate_due(at(10, 0, 30)));

        schedule.enabled = false;
        assert!(!schedule.is_fixed_rate_due(at(10, 0, 30)));
    }

    #[test]
    fn test_fixed_rate_out_of_range() {
        let mut schedule = TaskSchedule::fixed_rate("过大", 1, 10_000_000_000_000);
        assert!(matches!(
            schedule.validate(),
            Err(SchedulerError::InvalidSchedule(_))
        ));
        assert!(matches!(
            schedule.next_fixed_rate_time(at(10, 0, 0)),
            Err(SchedulerError::InvalidSchedule(_))
        ));

        // 已落库的异常数据不会被判定为到期
        schedule.last_execute_time = Some(at(10, 0, 0));
        assert!(!schedule.is_fixed_rate_due(at(10, 0, 30)));

        schedule.fixed_rate_seconds = Some(MAX_PERIOD_SECONDS);
        assert!(schedule.validate().is_ok());
        assert!(schedule.next_fixed_rate_time(at(10, 0, 0)).unwrap().is_some());
    }

    #[test]
    fn test_fixed_rate_respects_window() {
        let mut schedule = TaskSchedule::fixed_rate("窗口", 1, 30);
        schedule.start_time = Some(at(9, 0, 0));
        schedule.end_time = Some(at(17, 0, 0));
        assert!(!schedule.is_fixed_rate_due(at(8, 59, 59)));
        assert!(schedule.is_fixed_rate_due(at(9, 0, 0)));
        assert!(schedule.is_fixed_rate_due(at(17, 0, 0)));
        assert!(!schedule.is_fixed_rate_due(at(17, 0, 1)));
    }

    #[test]
    fn test_one_shot_due_only_once() {
        let mut schedule = TaskSchedule::one_shot("一次", 1, at(12, 0, 0));
        assert!(!schedule.is_one_shot_due(at(11, 59, 59)));
        assert!(schedule.is_one_shot_due(at(12, 0, 0)));

        schedule.last_execute_time = Some(at(12, 0, 5));
        assert!(!schedule.is_one_shot_due(at(13, 0, 0)));
    }

    #[test]
    fn test_clamp_to_window() {
        let mut schedule = TaskSchedule::fixed_rate("裁剪", 1, 60);
        schedule.start_time = Some(at(9, 0, 0));
        schedule.end_time = Some(at(17, 0, 0));
        assert_eq!(schedule.clamp_to_window(Some(at(8, 0, 0))), Some(at(9, 0, 0)));
        assert_eq!(schedule.clamp_to_window(Some(at(12, 0, 0))), Some(at(12, 0, 0)));
        assert_eq!(schedule.clamp_to_window(Some(at(18, 0, 0))), None);
        assert_eq!(schedule.clamp_to_window(None), None);
    }

    #[test]
    fn test_validate() {
        assert!(TaskSchedule::fixed_rate("a", 1, 0).validate().is_err());
        assert!(TaskSchedule::fixed_rate("a", 1, 10).validate().is_ok());
        assert!(TaskSchedule::cron("a", 1, " ").validate().is_err());

        let mut schedule = TaskSchedule::one_shot("a", 1, at(1, 0, 0));
        assert!(schedule.validate().is_ok());
        schedule.execute_time = None;
        assert!(schedule.validate().is_err());

        let mut schedule = TaskSchedule::fixed_rate("a", 1, 10);
        schedule.start_time = Some(at(12, 0, 0));
        schedule.end_time = Some(at(11, 0, 0));
        assert!(schedule.validate().is_err());
    }

    #[test]
    fn test_schedule_type_codes() {
        for ty in [ScheduleType::FixedRate, ScheduleType::Cron, ScheduleType::OneShot] {
            assert_eq!(ScheduleType::from_code(ty.code()), Some(ty));
        }
        assert_eq!(ScheduleType::from_code(4), None);
    }
}
