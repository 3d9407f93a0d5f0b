use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use collector_core::{SchedulerError, SchedulerResult};

/// CRON表达式解析和调度工具
///
/// 使用 `cron` crate 的 6/7 字段语法（秒 分 时 日 月 周 [年]）。
pub struct CronScheduler {
    schedule: Schedule,
}

impl CronScheduler {
    pub fn new(cron_expr: &str) -> SchedulerResult<Self> {
        let schedule =
            Schedule::from_str(cron_expr.trim()).map_err(|e| SchedulerError::InvalidCron {
                expr: cron_expr.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self { schedule })
    }

    /// 检查给定时间是否应该触发
    ///
    /// 参考时间为上次触发时间，从未触发时取 `now - lookback`；
    /// 参考时间之后的第一个触发点不晚于 `now` 时触发。
    pub fn should_trigger(
        &self,
        last_run: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        lookback: Duration,
    ) -> bool {
        let reference = last_run.unwrap_or(now - lookback);
        match self.schedule.after(&reference).next() {
            Some(next_time) => {
                let should_trigger = next_time <= now;
                if should_trigger {
                    debug!(
                        "CRON到期: 参考时间={}, 触发点={}, 当前时间={}",
                        reference.format("%Y-%m-%d %H:%M:%S UTC"),
                        next_time.format("%Y-%m-%d %H:%M:%S UTC"),
                        now.format("%Y-%m-%d %H:%M:%S UTC")
                    );
                }
                should_trigger
            }
            None => {
                warn!(
                    "无法计算下一次执行时间，参考时间: {}",
                    reference.format("%Y-%m-%d %H:%M:%S UTC")
                );
                false
            }
        }
    }

    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    pub fn upcoming_times(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&from).take(count).collect()
    }

    pub fn validate_cron_expression(cron_expr: &str) -> SchedulerResult<()> {
        Self::new(cron_expr).map(|_| ())
    }
}

/// 已解析表达式的缓存，只缓存解析结果，不缓存触发判断
#[derive(Default)]
pub struct CronCache {
    parsed: RwLock<HashMap<String, Arc<CronScheduler>>>,
}

impl CronCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, cron_expr: &str) -> SchedulerResult<Arc<CronScheduler>> {
        if let Some(scheduler) = self.parsed.read().await.get(cron_expr) {
            return Ok(scheduler.clone());
        }

        let scheduler = Arc::new(CronScheduler::new(cron_expr)?);
        self.parsed
            .write()
            .await
            .insert(cron_expr.to_string(), scheduler.clone());
        Ok(scheduler)
    }

    pub async fn len(&self) -> usize {
        self.parsed.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
