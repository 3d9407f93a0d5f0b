//! 调度与规则的管理操作
//!
//! "立即执行"与定时触发走同一个执行协调器，区别只在于在调用方同步执行并返回实例ID。

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use collector_core::models::{
    CollectorRule, ScheduleType, TaskSchedule, Trigger, TriggerSource,
};
use collector_core::traits::{
    CollectionExecutor, RuleRepository, ScheduleRepository, TaskRepository,
};
use collector_core::{SchedulerError, SchedulerResult};

use crate::trigger::TriggerEvaluator;

pub struct ScheduleAdminService {
    task_repo: Arc<dyn TaskRepository>,
    schedule_repo: Arc<dyn ScheduleRepository>,
    rule_repo: Arc<dyn RuleRepository>,
    executor: Arc<dyn CollectionExecutor>,
    evaluator: Arc<TriggerEvaluator>,
}

impl ScheduleAdminService {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        schedule_repo: Arc<dyn ScheduleRepository>,
        rule_repo: Arc<dyn RuleRepository>,
        executor: Arc<dyn CollectionExecutor>,
        evaluator: Arc<TriggerEvaluator>,
    ) -> Self {
        Self {
            task_repo,
            schedule_repo,
            rule_repo,
            executor,
            evaluator,
        }
    }

    async fn ensure_task(&self, task_id: i64) -> SchedulerResult<()> {
        match self.task_repo.get_by_id(task_id).await? {
            Some(_) => Ok(()),
            None => Err(SchedulerError::TaskNotFound { id: task_id }),
        }
    }

    // ---- 调度 ----

    pub async fn list_schedules(&self, task_id: Option<i64>) -> SchedulerResult<Vec<TaskSchedule>> {
        match task_id {
            Some(task_id) => self.schedule_repo.list_by_task(task_id).await,
            None => self.schedule_repo.list().await,
        }
    }

    pub async fn get_schedule(&self, id: i64) -> SchedulerResult<TaskSchedule> {
        self.schedule_repo
            .get_by_id(id)
            .await?
            .ok_or(SchedulerError::ScheduleNotFound { id })
    }

    #[instrument(skip(self, schedule), fields(task_id = schedule.task_id))]
    pub async fn create_schedule(&self, mut schedule: TaskSchedule) -> SchedulerResult<TaskSchedule> {
        self.evaluator.validate_schedule(&schedule).await?;
        self.ensure_task(schedule.task_id).await?;

        let now = Utc::now();
        schedule.id = 0;
        schedule.last_execute_time = None;
        schedule.next_execute_time = if schedule.enabled {
            self.evaluator.initial_schedule_time(&schedule, now).await?
        } else {
            None
        };
        schedule.created_at = now;
        schedule.updated_at = now;

        let created = self.schedule_repo.create(&schedule).await?;
        info!(
            schedule_id = created.id,
            schedule_type = ?created.schedule_type,
            next_execute_time = ?created.next_execute_time,
            "创建任务调度成功"
        );
        Ok(created)
    }

    /// 更新调度定义，保留上次执行时间并重新计算下次执行时间
    #[instrument(skip(self, schedule))]
    pub async fn update_schedule(
        &self,
        id: i64,
        mut schedule: TaskSchedule,
    ) -> SchedulerResult<TaskSchedule> {
        let existing = self.get_schedule(id).await?;
        self.evaluator.validate_schedule(&schedule).await?;
        if schedule.task_id != existing.task_id {
            self.ensure_task(schedule.task_id).await?;
        }

        let now = Utc::now();
        schedule.id = id;
        schedule.created_at = existing.created_at;
        schedule.last_execute_time = existing.last_execute_time;
        schedule.updated_at = now;
        schedule.next_execute_time = if schedule.enabled {
            self.evaluator.initial_schedule_time(&schedule, now).await?
        } else {
            None
        };

        self.schedule_repo.update(&schedule).await?;
        info!(schedule_id = id, "更新任务调度成功");
        self.get_schedule(id).await
    }

    pub async fn delete_schedule(&self, id: i64) -> SchedulerResult<()> {
        self.schedule_repo.delete(id).await?;
        info!(schedule_id = id, "删除任务调度成功");
        Ok(())
    }

    pub async fn enable_schedule(&self, id: i64) -> SchedulerResult<TaskSchedule> {
        let schedule = self.get_schedule(id).await?;
        if schedule.schedule_type == ScheduleType::OneShot && schedule.last_execute_time.is_some()
        {
            return Err(SchedulerError::InvalidSchedule(format!(
                "一次性调度已执行，不能重新启用: {id}"
            )));
        }

        let next = self
            .evaluator
            .initial_schedule_time(&schedule, Utc::now())
            .await?;
        self.schedule_repo.set_enabled(id, true, next).await?;
        info!(schedule_id = id, next_execute_time = ?next, "启用任务调度");
        self.get_schedule(id).await
    }

    pub async fn disable_schedule(&self, id: i64) -> SchedulerResult<TaskSchedule> {
        self.schedule_repo.set_enabled(id, false, None).await?;
        info!(schedule_id = id, "停用任务调度");
        self.get_schedule(id).await
    }

    /// 同步执行调度对应的任务，完成后记录调度的执行时间
    ///
    /// 一次性调度不记录执行时间，手动执行不会消耗它的那一次触发。
    #[instrument(skip(self))]
    pub async fn execute_schedule_now(&self, id: i64) -> SchedulerResult<i64> {
        let schedule = self.get_schedule(id).await?;
        let task = self
            .task_repo
            .get_by_id(schedule.task_id)
            .await?
            .ok_or(SchedulerError::TaskNotFound {
                id: schedule.task_id,
            })?;

        let trigger = Trigger {
            source: TriggerSource::Manual,
            schedule_id: Some(id),
            rule_id: None,
        };
        let instance_id = self.executor.execute(&task, trigger).await?;

        if schedule.schedule_type != ScheduleType::OneShot {
            if let Err(e) = self
                .schedule_repo
                .touch_last_execute_time(id, Utc::now())
                .await
            {
                warn!(schedule_id = id, error = %e, "记录调度执行时间失败");
            }
        }
        Ok(instance_id)
    }

    // ---- 规则 ----

    pub async fn list_rules(&self) -> SchedulerResult<Vec<CollectorRule>> {
        self.rule_repo.list().await
    }

    pub async fn get_rule(&self, id: i64) -> SchedulerResult<CollectorRule> {
        self.rule_repo
            .get_by_id(id)
            .await?
            .ok_or(SchedulerError::RuleNotFound { id })
    }

    #[instrument(skip(self, rule), fields(rule_name = %rule.name))]
    pub async fn create_rule(&self, mut rule: CollectorRule) -> SchedulerResult<CollectorRule> {
        self.evaluator.validate_rule(&rule).await?;
        for &task_id in &rule.task_ids {
            self.ensure_task(task_id).await?;
        }

        let now = Utc::now();
        rule.id = 0;
        rule.last_execute_time = None;
        rule.next_execute_time = if rule.enabled {
            self.evaluator.rule_next_time(&rule, now).await?
        } else {
            None
        };
        rule.created_at = now;
        rule.updated_at = now;

        let created = self.rule_repo.create(&rule).await?;
        info!(rule_id = created.id, tasks = created.task_ids.len(), "创建采集规则成功");
        Ok(created)
    }

    #[instrument(skip(self, rule))]
    pub async fn update_rule(&self, id: i64, mut rule: CollectorRule) -> SchedulerResult<CollectorRule> {
        let existing = self.get_rule(id).await?;
        self.evaluator.validate_rule(&rule).await?;
        for &task_id in &rule.task_ids {
            self.ensure_task(task_id).await?;
        }

        let now = Utc::now();
        rule.id = id;
        rule.created_at = existing.created_at;
        rule.last_execute_time = existing.last_execute_time;
        rule.updated_at = now;
        rule.next_execute_time = if rule.enabled {
            self.evaluator.rule_next_time(&rule, now).await?
        } else {
            None
        };

        self.rule_repo.update(&rule).await?;
        info!(rule_id = id, "更新采集规则成功");
        self.get_rule(id).await
    }

    pub async fn delete_rule(&self, id: i64) -> SchedulerResult<()> {
        self.rule_repo.delete(id).await?;
        info!(rule_id = id, "删除采集规则成功");
        Ok(())
    }

    pub async fn enable_rule(&self, id: i64) -> SchedulerResult<CollectorRule> {
        let rule = self.get_rule(id).await?;
        let next = self.evaluator.rule_next_time(&rule, Utc::now()).await?;
        self.rule_repo.set_enabled(id, true, next).await?;
        info!(rule_id = id, next_execute_time = ?next, "启用采集规则");
        self.get_rule(id).await
    }

    /// 停用规则并清空下次执行时间
    pub async fn disable_rule(&self, id: i64) -> SchedulerResult<CollectorRule> {
        self.rule_repo.set_enabled(id, false, None).await?;
        info!(rule_id = id, "停用采集规则");
        self.get_rule(id).await
    }

    /// 依次同步执行规则的每个成员任务，单个任务失败不影响其余任务
    #[instrument(skip(self))]
    pub async fn execute_rule_now(&self, id: i64) -> SchedulerResult<Vec<i64>> {
        let rule = self.get_rule(id).await?;
        let trigger = Trigger {
            source: TriggerSource::Manual,
            schedule_id: None,
            rule_id: Some(id),
        };

        let mut instance_ids = Vec::with_capacity(rule.task_ids.len());
        for &task_id in &rule.task_ids {
            let task = match self.task_repo.get_by_id(task_id).await {
                Ok(Some(task)) => task,
                Ok(None) => {
                    warn!(rule_id = id, task_id, "规则成员任务不存在");
                    continue;
                }
                Err(e) => {
                    warn!(rule_id = id, task_id, error = %e, "读取规则成员任务失败");
                    continue;
                }
            };

            match self.executor.execute(&task, trigger).await {
                Ok(instance_id) => instance_ids.push(instance_id),
                Err(e) => warn!(rule_id = id, task_id, error = %e, "规则成员任务执行失败"),
            }
        }
        Ok(instance_ids)
    }

    // ---- 任务 ----

    /// 同步执行任务，完成后返回实例ID
    #[instrument(skip(self))]
    pub async fn execute_task_now(&self, task_id: i64) -> SchedulerResult<i64> {
        let task = self
            .task_repo
            .get_by_id(task_id)
            .await?
            .ok_or(SchedulerError::TaskNotFound { id: task_id })?;
        self.executor.execute(&task, Trigger::manual()).await
    }
}
