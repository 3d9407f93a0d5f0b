use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use collector_core::models::{TaskSchedule, Trigger, TriggerSource};
use collector_core::traits::{CollectionJob, ScheduleRepository, TaskDispatcher, TaskRepository};
use collector_core::{SchedulerError, SchedulerResult};

use crate::scan::{guarded, load_dispatchable_task, FireOutcome, LoopKind, ScanReport};
use crate::trigger::TriggerEvaluator;

/// 按任务调度扫描：固定频率、Cron、一次性
///
/// 每个调度项先通过比较并设置占用，占用成功后才派发，
/// 重叠的扫描周期不会重复触发同一次调度。
pub struct ScheduleScanner {
    schedule_repo: Arc<dyn ScheduleRepository>,
    task_repo: Arc<dyn TaskRepository>,
    dispatcher: Arc<dyn TaskDispatcher>,
    evaluator: Arc<TriggerEvaluator>,
}

impl ScheduleScanner {
    pub fn new(
        schedule_repo: Arc<dyn ScheduleRepository>,
        task_repo: Arc<dyn TaskRepository>,
        dispatcher: Arc<dyn TaskDispatcher>,
        evaluator: Arc<TriggerEvaluator>,
    ) -> Self {
        Self {
            schedule_repo,
            task_repo,
            dispatcher,
            evaluator,
        }
    }

    #[instrument(skip(self))]
    pub async fn scan_fixed_rate(&self, now: DateTime<Utc>) -> SchedulerResult<ScanReport> {
        let due = self.schedule_repo.find_due_fixed_rate(now).await?;
        let mut report = ScanReport::new(LoopKind::FixedRate, due.len());
        for schedule in &due {
            report.record(schedule.id, guarded(self.fire_fixed_rate(schedule, now)).await);
        }
        Ok(report)
    }

    #[instrument(skip(self))]
    pub async fn scan_cron(&self, now: DateTime<Utc>) -> SchedulerResult<ScanReport> {
        let candidates = self.schedule_repo.find_cron_in_window(now).await?;
        let mut report = ScanReport::new(LoopKind::Cron, candidates.len());
        for schedule in &candidates {
            report.record(schedule.id, guarded(self.fire_cron(schedule, now)).await);
        }
        Ok(report)
    }

    #[instrument(skip(self))]
    pub async fn scan_one_shot(&self, now: DateTime<Utc>) -> SchedulerResult<ScanReport> {
        let due = self.schedule_repo.find_due_one_shot(now).await?;
        let mut report = ScanReport::new(LoopKind::OneShot, due.len());
        for schedule in &due {
            report.record(schedule.id, guarded(self.fire_one_shot(schedule, now)).await);
        }
        Ok(report)
    }

    async fn fire_fixed_rate(
        &self,
        schedule: &TaskSchedule,
        now: DateTime<Utc>,
    ) -> SchedulerResult<FireOutcome> {
        let task = match load_dispatchable_task(self.task_repo.as_ref(), schedule.task_id).await? {
            Ok(task) => task,
            Err(reason) => return Ok(FireOutcome::Skipped(reason)),
        };

        let next = schedule.clamp_to_window(schedule.next_fixed_rate_time(now)?);
        let claimed = self
            .schedule_repo
            .claim_fire(schedule.id, schedule.last_execute_time, now, next)
            .await?;
        if !claimed {
            return Ok(FireOutcome::Conflict);
        }

        self.dispatcher.submit(CollectionJob::new(
            task,
            Trigger::schedule(TriggerSource::FixedRate, schedule.id),
        ))?;
        debug!(schedule_id = schedule.id, next_execute_time = ?next, "固定频率调度已触发");
        Ok(FireOutcome::Fired {
            dispatched: 1,
            rejected: 0,
        })
    }

    async fn fire_cron(
        &self,
        schedule: &TaskSchedule,
        now: DateTime<Utc>,
    ) -> SchedulerResult<FireOutcome> {
        let expression = schedule.cron_expression.as_deref().ok_or_else(|| {
            SchedulerError::InvalidSchedule(format!("Cron调度缺少表达式: {}", schedule.id))
        })?;

        // 只根据表达式和上次触发时间判断，不使用 next_execute_time
        if !self
            .evaluator
            .cron_is_due(expression, schedule.last_execute_time, now)
            .await?
        {
            return Ok(FireOutcome::NotDue);
        }

        let task = match load_dispatchable_task(self.task_repo.as_ref(), schedule.task_id).await? {
            Ok(task) => task,
            Err(reason) => return Ok(FireOutcome::Skipped(reason)),
        };

        let next = self
            .evaluator
            .next_schedule_time_after_fire(schedule, now)
            .await?;
        let claimed = self
            .schedule_repo
            .claim_fire(schedule.id, schedule.last_execute_time, now, next)
            .await?;
        if !claimed {
            return Ok(FireOutcome::Conflict);
        }

        self.dispatcher.submit(CollectionJob::new(
            task,
            Trigger::schedule(TriggerSource::Cron, schedule.id),
        ))?;
        debug!(schedule_id = schedule.id, expression, "Cron调度已触发");
        Ok(FireOutcome::Fired {
            dispatched: 1,
            rejected: 0,
        })
    }

    async fn fire_one_shot(
        &self,
        schedule: &TaskSchedule,
        now: DateTime<Utc>,
    ) -> SchedulerResult<FireOutcome> {
        let task = match load_dispatchable_task(self.task_repo.as_ref(), schedule.task_id).await? {
            Ok(task) => task,
            Err(reason) => return Ok(FireOutcome::Skipped(reason)),
        };

        // 占用成功的同时调度被永久禁用
        if !self.schedule_repo.claim_one_shot(schedule.id, now).await? {
            return Ok(FireOutcome::Conflict);
        }

        self.dispatcher.submit(CollectionJob::new(
            task,
            Trigger::schedule(TriggerSource::OneShot, schedule.id),
        ))?;
        debug!(schedule_id = schedule.id, "一次性调度已触发并停用");
        Ok(FireOutcome::Fired {
            dispatched: 1,
            rejected: 0,
        })
    }
}
