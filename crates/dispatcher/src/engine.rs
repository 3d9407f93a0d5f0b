use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use collector_core::config::SchedulerConfig;
use collector_core::traits::{RuleRepository, ScheduleRepository, TaskDispatcher, TaskRepository};
use collector_core::SchedulerResult;

use crate::interval_scanner::IntervalScanner;
use crate::rule_scanner::RuleScanner;
use crate::scan::{LoopKind, ScanReport};
use crate::schedule_scanner::ScheduleScanner;
use crate::trigger::TriggerEvaluator;

/// 调度引擎
///
/// 固定频率、Cron、一次性和规则四个循环各自独立计时，间隔任务循环按配置开启。
/// 循环之间不共享内存状态，只通过持久化的调度、规则和任务行协作。
pub struct SchedulingEngine {
    config: SchedulerConfig,
    schedules: Arc<ScheduleScanner>,
    rules: Arc<RuleScanner>,
    intervals: Arc<IntervalScanner>,
    evaluator: Arc<TriggerEvaluator>,
}

impl SchedulingEngine {
    pub fn new(
        config: SchedulerConfig,
        task_repo: Arc<dyn TaskRepository>,
        schedule_repo: Arc<dyn ScheduleRepository>,
        rule_repo: Arc<dyn RuleRepository>,
        dispatcher: Arc<dyn TaskDispatcher>,
    ) -> Self {
        let evaluator = Arc::new(TriggerEvaluator::new(config.cron_lookback()));

        Self {
            schedules: Arc::new(ScheduleScanner::new(
                schedule_repo,
                task_repo.clone(),
                dispatcher.clone(),
                evaluator.clone(),
            )),
            rules: Arc::new(RuleScanner::new(
                rule_repo,
                task_repo.clone(),
                dispatcher.clone(),
                evaluator.clone(),
            )),
            intervals: Arc::new(IntervalScanner::new(task_repo, dispatcher)),
            evaluator,
            config,
        }
    }

    /// 管理服务与引擎共用同一个触发判断器
    pub fn evaluator(&self) -> Arc<TriggerEvaluator> {
        self.evaluator.clone()
    }

    /// 启动所有调度循环，收到关闭信号后各循环在当前扫描结束后退出
    pub fn start(&self, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        if !self.config.enabled {
            info!("调度引擎已禁用，不启动调度循环");
            return Vec::new();
        }

        let mut handles = Vec::new();

        let schedules = self.schedules.clone();
        handles.push(spawn_loop(
            LoopKind::FixedRate,
            self.config.fixed_rate_poll_seconds,
            shutdown.subscribe(),
            move |now| {
                let schedules = schedules.clone();
                async move { schedules.scan_fixed_rate(now).await }
            },
        ));

        let schedules = self.schedules.clone();
        handles.push(spawn_loop(
            LoopKind::Cron,
            self.config.cron_poll_seconds,
            shutdown.subscribe(),
            move |now| {
                let schedules = schedules.clone();
                async move { schedules.scan_cron(now).await }
            },
        ));

        let schedules = self.schedules.clone();
        handles.push(spawn_loop(
            LoopKind::OneShot,
            self.config.one_shot_poll_seconds,
            shutdown.subscribe(),
            move |now| {
                let schedules = schedules.clone();
                async move { schedules.scan_one_shot(now).await }
            },
        ));

        let rules = self.rules.clone();
        handles.push(spawn_loop(
            LoopKind::Rule,
            self.config.rule_poll_seconds,
            shutdown.subscribe(),
            move |now| {
                let rules = rules.clone();
                async move { rules.scan(now).await }
            },
        ));

        if self.config.interval_tasks_enabled {
            let intervals = self.intervals.clone();
            handles.push(spawn_loop(
                LoopKind::Interval,
                self.config.interval_task_poll_seconds,
                shutdown.subscribe(),
                move |now| {
                    let intervals = intervals.clone();
                    async move { intervals.scan(now).await }
                },
            ));
        }

        info!(loops = handles.len(), "调度引擎已启动");
        handles
    }

    /// 在给定时间点把每个循环执行一次
    pub async fn run_once(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<ScanReport>> {
        let mut reports = vec![
            self.schedules.scan_fixed_rate(now).await?,
            self.schedules.scan_cron(now).await?,
            self.schedules.scan_one_shot(now).await?,
            self.rules.scan(now).await?,
        ];
        if self.config.interval_tasks_enabled {
            reports.push(self.intervals.scan(now).await?);
        }
        Ok(reports)
    }
}

fn spawn_loop<F, Fut>(
    kind: LoopKind,
    period_seconds: u64,
    mut shutdown: broadcast::Receiver<()>,
    scan: F,
) -> JoinHandle<()>
where
    F: Fn(DateTime<Utc>) -> Fut + Send + 'static,
    Fut: Future<Output = SchedulerResult<ScanReport>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(period_seconds.max(1)));
        // 扫描耗时超过周期时跳过错过的节拍，不会连续补扫
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(scan_loop = kind.as_str(), period_seconds, "调度循环已启动");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!(scan_loop = kind.as_str(), "调度循环已停止");
                    break;
                }
                _ = ticker.tick() => {
                    match AssertUnwindSafe(scan(Utc::now())).catch_unwind().await {
                        Ok(Ok(report)) => report.log(),
                        Ok(Err(e)) => error!(scan_loop = kind.as_str(), error = %e, "调度扫描失败"),
                        Err(_) => error!(scan_loop = kind.as_str(), "调度扫描时发生panic"),
                    }
                }
            }
        }
    })
}
