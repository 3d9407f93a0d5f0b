use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 调度循环配置，各循环的轮询周期互相独立
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub fixed_rate_poll_seconds: u64,
    pub cron_poll_seconds: u64,
    pub one_shot_poll_seconds: u64,
    pub rule_poll_seconds: u64,
    pub interval_tasks_enabled: bool,
    pub interval_task_poll_seconds: u64,
    /// 从未执行过的 Cron 调度向前回看的窗口
    pub cron_lookback_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fixed_rate_poll_seconds: 10,
            cron_poll_seconds: 60,
            one_shot_poll_seconds: 60,
            rule_poll_seconds: 15,
            interval_tasks_enabled: false,
            interval_task_poll_seconds: 10,
            cron_lookback_seconds: 60,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let cadences = [
            ("fixed_rate_poll_seconds", self.fixed_rate_poll_seconds),
            ("cron_poll_seconds", self.cron_poll_seconds),
            ("one_shot_poll_seconds", self.one_shot_poll_seconds),
            ("rule_poll_seconds", self.rule_poll_seconds),
            ("interval_task_poll_seconds", self.interval_task_poll_seconds),
        ];
        for (name, value) in cadences {
            if value == 0 {
                return Err(anyhow::anyhow!("轮询周期 {name} 必须大于0"));
            }
        }

        // 回看窗口小于轮询周期时，两次轮询之间的触发点会被漏掉
        if self.cron_lookback_seconds < self.cron_poll_seconds {
            return Err(anyhow::anyhow!(
                "Cron回看窗口({}秒)不能小于Cron轮询周期({}秒)",
                self.cron_lookback_seconds,
                self.cron_poll_seconds
            ));
        }

        Ok(())
    }

    pub fn cron_lookback(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cron_lookback_seconds as i64)
    }
}

/// 执行池配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub worker_count: usize,
    pub queue_capacity: usize,
    /// 单次采集的超时时间，0 表示使用任务的采集间隔
    pub collect_timeout_seconds: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_count: 10,
            queue_capacity: 100,
            collect_timeout_seconds: 0,
        }
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_count == 0 {
            return Err(anyhow::anyhow!("执行线程数必须大于0"));
        }

        if self.queue_capacity == 0 {
            return Err(anyhow::anyhow!("执行队列容量必须大于0"));
        }

        Ok(())
    }

    /// 计算某个任务的采集超时，没有可用的上限时返回 None
    pub fn collect_timeout(&self, task_interval_seconds: i64) -> Option<Duration> {
        if self.collect_timeout_seconds > 0 {
            Some(Duration::from_secs(self.collect_timeout_seconds))
        } else if task_interval_seconds > 0 {
            Some(Duration::from_secs(task_interval_seconds as u64))
        } else {
            None
        }
    }
}
