//! 触发判断
//!
//! 调度和规则是否到期都在每个扫描周期重新计算。Cron 调度的 `next_execute_time`
//! 只用于展示，真正的判断始终由表达式和上次触发时间得出。

use chrono::{DateTime, Duration, NaiveTime, Utc};

use collector_core::models::{
    checked_offset, CollectorRule, RuleType, ScheduleType, TaskSchedule,
};
use collector_core::{SchedulerError, SchedulerResult};

use crate::cron_utils::CronCache;

/// `after` 之后的第一个每日固定时刻（UTC）
pub fn next_fixed_time(at: NaiveTime, after: DateTime<Utc>) -> DateTime<Utc> {
    let today = after.date_naive().and_time(at).and_utc();
    if today > after {
        today
    } else {
        today + Duration::days(1)
    }
}

pub struct TriggerEvaluator {
    cron_cache: CronCache,
    lookback: Duration,
}

impl TriggerEvaluator {
    pub fn new(lookback: Duration) -> Self {
        Self {
            cron_cache: CronCache::new(),
            lookback,
        }
    }

    pub fn lookback(&self) -> Duration {
        self.lookback
    }

    pub async fn cron_is_due(
        &self,
        cron_expr: &str,
        last: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> SchedulerResult<bool> {
        let cron = self.cron_cache.get(cron_expr).await?;
        Ok(cron.should_trigger(last, now, self.lookback))
    }

    pub async fn next_cron_time(
        &self,
        cron_expr: &str,
        after: DateTime<Utc>,
    ) -> SchedulerResult<Option<DateTime<Utc>>> {
        let cron = self.cron_cache.get(cron_expr).await?;
        Ok(cron.next_execution_time(after))
    }

    /// 字段校验之外还要求 Cron 表达式能够解析
    pub async fn validate_schedule(&self, schedule: &TaskSchedule) -> SchedulerResult<()> {
        schedule.validate()?;
        if schedule.schedule_type == ScheduleType::Cron {
            self.cron_cache.get(cron_expression(schedule)?).await?;
        }
        Ok(())
    }

    /// 创建或启用调度时的下次执行时间，按有效期裁剪
    pub async fn initial_schedule_time(
        &self,
        schedule: &TaskSchedule,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Option<DateTime<Utc>>> {
        let next = match schedule.schedule_type {
            ScheduleType::FixedRate => schedule.next_fixed_rate_time(now)?,
            ScheduleType::Cron => {
                let reference = match schedule.start_time {
                    Some(start) if start > now => start - Duration::seconds(1),
                    _ => now,
                };
                self.next_cron_time(cron_expression(schedule)?, reference)
                    .await?
            }
            ScheduleType::OneShot => schedule.execute_time,
        };
        Ok(schedule.clamp_to_window(next))
    }

    /// Cron 调度触发后用于展示的下次执行时间
    pub async fn next_schedule_time_after_fire(
        &self,
        schedule: &TaskSchedule,
        fired_at: DateTime<Utc>,
    ) -> SchedulerResult<Option<DateTime<Utc>>> {
        let next = match schedule.schedule_type {
            ScheduleType::FixedRate => schedule.next_fixed_rate_time(fired_at)?,
            ScheduleType::Cron => {
                self.next_cron_time(cron_expression(schedule)?, fired_at)
                    .await?
            }
            ScheduleType::OneShot => None,
        };
        Ok(schedule.clamp_to_window(next))
    }

    pub async fn validate_rule(&self, rule: &CollectorRule) -> SchedulerResult<()> {
        rule.validate()?;
        if rule.rule_type == RuleType::Cron {
            self.cron_cache.get(&rule.expression).await?;
        }
        Ok(())
    }

    pub async fn rule_is_due(
        &self,
        rule: &CollectorRule,
        now: DateTime<Utc>,
    ) -> SchedulerResult<bool> {
        if !rule.enabled {
            return Ok(false);
        }
        match rule.rule_type {
            RuleType::Interval => {
                let seconds = rule.interval_seconds()?;
                match rule.last_execute_time {
                    None => Ok(true),
                    Some(last) => Ok(now >= interval_after(rule, last, seconds)?),
                }
            }
            RuleType::FixedTime => {
                let at = rule.fixed_time()?;
                let reference = rule.last_execute_time.unwrap_or(now - self.lookback);
                Ok(next_fixed_time(at, reference) <= now)
            }
            RuleType::Cron => {
                self.cron_is_due(&rule.expression, rule.last_execute_time, now)
                    .await
            }
        }
    }

    /// 规则在 `after` 之后的下次执行时间，只用于展示
    pub async fn rule_next_time(
        &self,
        rule: &CollectorRule,
        after: DateTime<Utc>,
    ) -> SchedulerResult<Option<DateTime<Utc>>> {
        match rule.rule_type {
            RuleType::Interval => {
                let seconds = rule.interval_seconds()?;
                Ok(Some(interval_after(rule, after, seconds)?))
            }
            RuleType::FixedTime => Ok(Some(next_fixed_time(rule.fixed_time()?, after))),
            RuleType::Cron => self.next_cron_time(&rule.expression, after).await,
        }
    }
}

fn interval_after(
    rule: &CollectorRule,
    from: DateTime<Utc>,
    seconds: i64,
) -> SchedulerResult<DateTime<Utc>> {
    checked_offset(from, seconds).ok_or_else(|| {
        SchedulerError::InvalidRule(format!(
            "规则 {} 的间隔超出时间范围: {seconds}秒",
            rule.id
        ))
    })
}

fn cron_expression(schedule: &TaskSchedule) -> SchedulerResult<&str> {
    schedule
        .cron_expression
        .as_deref()
        .ok_or_else(|| SchedulerError::InvalidSchedule("Cron调度必须配置Cron表达式".to_string()))
}
