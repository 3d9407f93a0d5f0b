use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use metrics::counter;
use tracing::{debug, error, info, warn};

use collector_core::models::CollectorTask;
use collector_core::traits::TaskRepository;
use collector_core::{SchedulerError, SchedulerResult};

/// 调度循环
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopKind {
    FixedRate,
    Cron,
    OneShot,
    Rule,
    Interval,
}

impl LoopKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopKind::FixedRate => "fixed_rate",
            LoopKind::Cron => "cron",
            LoopKind::OneShot => "one_shot",
            LoopKind::Rule => "rule",
            LoopKind::Interval => "interval",
        }
    }
}

impl std::fmt::Display for LoopKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个调度项的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    /// 表达式判断本周期未到期
    NotDue,
    /// 已被其他扫描周期占用
    Conflict,
    /// 任务不存在或已禁用
    Skipped(String),
    /// 已占用并派发；`rejected` 为派发失败的成员任务数
    Fired { dispatched: usize, rejected: usize },
}

/// 一个扫描周期的汇总
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub kind: LoopKind,
    pub candidates: usize,
    pub fired: usize,
    pub dispatched: usize,
    pub rejected: usize,
    pub conflicts: usize,
    pub skipped: usize,
    pub failures: usize,
}

impl ScanReport {
    pub fn new(kind: LoopKind, candidates: usize) -> Self {
        Self {
            kind,
            candidates,
            fired: 0,
            dispatched: 0,
            rejected: 0,
            conflicts: 0,
            skipped: 0,
            failures: 0,
        }
    }

    /// 记录一个调度项的结果，错误只记录日志和计数
    pub fn record(&mut self, item_id: i64, outcome: SchedulerResult<FireOutcome>) {
        let scan_loop = self.kind.as_str();
        match outcome {
            Ok(FireOutcome::NotDue) => {}
            Ok(FireOutcome::Conflict) => {
                self.conflicts += 1;
                counter!("scheduler_claim_conflicts_total", "loop" => scan_loop).increment(1);
                info!(scan_loop, item_id, "调度项已被其他扫描周期占用，跳过");
            }
            Ok(FireOutcome::Skipped(reason)) => {
                self.skipped += 1;
                debug!(scan_loop, item_id, reason = %reason, "跳过调度项");
            }
            Ok(FireOutcome::Fired {
                dispatched,
                rejected,
            }) => {
                self.fired += 1;
                self.dispatched += dispatched;
                self.rejected += rejected;
                counter!("scheduler_fires_total", "loop" => scan_loop).increment(1);
                if rejected > 0 {
                    counter!("scheduler_item_failures_total", "loop" => scan_loop)
                        .increment(rejected as u64);
                }
            }
            Err(e) => {
                self.failures += 1;
                counter!("scheduler_item_failures_total", "loop" => scan_loop).increment(1);
                error!(scan_loop, item_id, kind = e.kind().label(), error = %e, "处理调度项失败");
            }
        }
    }

    pub fn log(&self) {
        if self.fired > 0 || self.failures > 0 || self.conflicts > 0 {
            info!(
                scan_loop = self.kind.as_str(),
                candidates = self.candidates,
                fired = self.fired,
                dispatched = self.dispatched,
                rejected = self.rejected,
                conflicts = self.conflicts,
                skipped = self.skipped,
                failures = self.failures,
                "调度扫描完成"
            );
        } else {
            debug!(
                scan_loop = self.kind.as_str(),
                candidates = self.candidates,
                "调度扫描完成，没有触发"
            );
        }
    }
}

/// 处理单个调度项，panic 转换为内部错误，不会中断整个扫描周期
pub(crate) async fn guarded<F>(item: F) -> SchedulerResult<FireOutcome>
where
    F: Future<Output = SchedulerResult<FireOutcome>>,
{
    AssertUnwindSafe(item)
        .catch_unwind()
        .await
        .unwrap_or_else(|_| Err(SchedulerError::Internal("处理调度项时发生panic".to_string())))
}

/// 读取可派发的任务，任务不存在或已禁用时返回跳过原因
pub(crate) async fn load_dispatchable_task(
    task_repo: &dyn TaskRepository,
    task_id: i64,
) -> SchedulerResult<Result<CollectorTask, String>> {
    match task_repo.get_by_id(task_id).await? {
        None => {
            warn!(task_id, "调度引用的任务不存在");
            Ok(Err(format!("任务不存在: {task_id}")))
        }
        Some(task) if !task.is_enabled() => Ok(Err(format!("任务已禁用: {task_id}"))),
        Some(task) => Ok(Ok(task)),
    }
}
