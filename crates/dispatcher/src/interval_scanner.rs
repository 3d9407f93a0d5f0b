use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use collector_core::models::{CollectorTask, Trigger};
use collector_core::traits::{CollectionJob, TaskDispatcher, TaskRepository};
use collector_core::SchedulerResult;

use crate::scan::{guarded, FireOutcome, LoopKind, ScanReport};

/// 按任务自身采集间隔的扫描，默认关闭
///
/// 同时配置了调度的任务在开启后会被两边各触发一次。
pub struct IntervalScanner {
    task_repo: Arc<dyn TaskRepository>,
    dispatcher: Arc<dyn TaskDispatcher>,
}

impl IntervalScanner {
    pub fn new(task_repo: Arc<dyn TaskRepository>, dispatcher: Arc<dyn TaskDispatcher>) -> Self {
        Self {
            task_repo,
            dispatcher,
        }
    }

    #[instrument(skip(self))]
    pub async fn scan(&self, now: DateTime<Utc>) -> SchedulerResult<ScanReport> {
        let due = self.task_repo.find_due_interval_tasks(now).await?;
        let mut report = ScanReport::new(LoopKind::Interval, due.len());
        for task in due {
            let task_id = task.id;
            report.record(task_id, guarded(self.fire(task, now)).await);
        }
        Ok(report)
    }

    async fn fire(&self, task: CollectorTask, now: DateTime<Utc>) -> SchedulerResult<FireOutcome> {
        if !self
            .task_repo
            .claim_interval(task.id, task.last_execute_time, now)
            .await?
        {
            return Ok(FireOutcome::Conflict);
        }

        let task_id = task.id;
        self.dispatcher
            .submit(CollectionJob::new(task, Trigger::interval()))?;
        debug!(task_id, "间隔任务已触发");
        Ok(FireOutcome::Fired {
            dispatched: 1,
            rejected: 0,
        })
    }
}
