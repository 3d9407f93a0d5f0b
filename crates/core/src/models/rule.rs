use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::{sqlite_text_enum, MAX_PERIOD_SECONDS};
use crate::{SchedulerError, SchedulerResult};

/// 采集规则
///
/// 一条规则把多个采集任务组织在同一个触发表达式下，规则触发时依次派发
/// 其中的每个任务。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorRule {
    pub id: i64,
    pub name: String,
    pub rule_type: RuleType,
    pub expression: String,
    pub enabled: bool,
    pub description: Option<String>,
    pub task_ids: Vec<i64>,
    pub timeout_seconds: i32,
    pub retry_count: i32,
    pub retry_interval_seconds: i32,
    pub last_execute_time: Option<DateTime<Utc>>,
    pub next_execute_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 规则表达式类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RuleType {
    #[serde(rename = "cron")]
    Cron,
    #[serde(rename = "interval")]
    Interval,
    #[serde(rename = "fixedTime")]
    FixedTime,
}

sqlite_text_enum!(RuleType {
    Cron => "cron",
    Interval => "interval",
    FixedTime => "fixedTime",
});

impl CollectorRule {
    pub fn new(
        name: impl Into<String>,
        rule_type: RuleType,
        expression: impl Into<String>,
        task_ids: Vec<i64>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: name.into(),
            rule_type,
            expression: expression.into(),
            enabled: true,
            description: None,
            task_ids,
            timeout_seconds: 60,
            retry_count: 0,
            retry_interval_seconds: 30,
            last_execute_time: None,
            next_execute_time: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// interval 类型规则的间隔秒数
    pub fn interval_seconds(&self) -> SchedulerResult<i64> {
        let seconds: i64 = self.expression.trim().parse().map_err(|_| {
            SchedulerError::InvalidRule(format!("间隔表达式必须是秒数: {}", self.expression))
        })?;
        if seconds <= 0 {
            return Err(SchedulerError::InvalidRule(format!(
                "间隔秒数必须大于0: {seconds}"
            )));
        }
        if seconds > MAX_PERIOD_SECONDS {
            return Err(SchedulerError::InvalidRule(format!(
                "间隔秒数不能超过{MAX_PERIOD_SECONDS}: {seconds}"
            )));
        }
        Ok(seconds)
    }

    /// fixedTime 类型规则的每日触发时刻（UTC，HH:MM:SS）
    pub fn fixed_time(&self) -> SchedulerResult<NaiveTime> {
        NaiveTime::parse_from_str(self.expression.trim(), "%H:%M:%S").map_err(|e| {
            SchedulerError::InvalidRule(format!(
                "固定时间表达式格式应为HH:MM:SS: {} ({e})",
                self.expression
            ))
        })
    }

    /// 校验名称和成员任务，表达式语法由调度模块按类型校验
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.name.trim().is_empty() {
            return Err(SchedulerError::InvalidRule("规则名称不能为空".to_string()));
        }
        if self.task_ids.is_empty() {
            return Err(SchedulerError::InvalidRule("规则至少需要包含一个任务".to_string()));
        }
        if self.timeout_seconds <= 0 {
            return Err(SchedulerError::InvalidRule("超时时间必须大于0".to_string()));
        }
        if self.retry_count < 0 || self.retry_interval_seconds < 0 {
            return Err(SchedulerError::InvalidRule(
                "重试次数和重试间隔不能为负数".to_string(),
            ));
        }
        match self.rule_type {
            RuleType::Interval => self.interval_seconds().map(|_| ()),
            RuleType::FixedTime => self.fixed_time().map(|_| ()),
            RuleType::Cron => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_expression() {
        let rule = CollectorRule::new("r", RuleType::Interval, "300", vec![1]);
        assert_eq!(rule.interval_seconds().unwrap(), 300);

        let rule = CollectorRule::new("r", RuleType::Interval, "abc", vec![1]);
        assert!(rule.interval_seconds().is_err());
        assert!(rule.validate().is_err());

        let rule = CollectorRule::new("r", RuleType::Interval, "0", vec![1]);
        assert!(rule.interval_seconds().is_err());

        let rule = CollectorRule::new("r", RuleType::Interval, "10000000000000", vec![1]);
        assert!(matches!(
            rule.validate(),
            Err(SchedulerError::InvalidRule(_))
        ));
    }

    #[test]
    fn test_fixed_time_expression() {
        let rule = CollectorRule::new("r", RuleType::FixedTime, "08:30:00", vec![1]);
        assert_eq!(
            rule.fixed_time().unwrap(),
            NaiveTime::from_hms_opt(8, 30, 0).unwrap()
        );

        let rule = CollectorRule::new("r", RuleType::FixedTime, "25:00:00", vec![1]);
        assert!(rule.fixed_time().is_err());
    }

    #[test]
    fn test_rule_requires_members() {
        let rule = CollectorRule::new("r", RuleType::Interval, "60", vec![]);
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_rule_type_text() {
        assert_eq!(RuleType::FixedTime.as_str(), "fixedTime");
        assert_eq!("cron".parse::<RuleType>().unwrap(), RuleType::Cron);
    }
}
