use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use collector_core::models::{CollectorRule, Trigger};
use collector_core::traits::{CollectionJob, RuleRepository, TaskDispatcher, TaskRepository};
use collector_core::SchedulerResult;

use crate::scan::{guarded, load_dispatchable_task, FireOutcome, LoopKind, ScanReport};
use crate::trigger::TriggerEvaluator;

/// 规则扫描：规则到期时批量派发其成员任务
///
/// 成员任务之间互不影响，任何一个派发失败都只记录日志，
/// 规则的上次执行时间在派发前已经通过占用推进。
pub struct RuleScanner {
    rule_repo: Arc<dyn RuleRepository>,
    task_repo: Arc<dyn TaskRepository>,
    dispatcher: Arc<dyn TaskDispatcher>,
    evaluator: Arc<TriggerEvaluator>,
}

impl RuleScanner {
    pub fn new(
        rule_repo: Arc<dyn RuleRepository>,
        task_repo: Arc<dyn TaskRepository>,
        dispatcher: Arc<dyn TaskDispatcher>,
        evaluator: Arc<TriggerEvaluator>,
    ) -> Self {
        Self {
            rule_repo,
            task_repo,
            dispatcher,
            evaluator,
        }
    }

    #[instrument(skip(self))]
    pub async fn scan(&self, now: DateTime<Utc>) -> SchedulerResult<ScanReport> {
        let rules = self.rule_repo.find_enabled().await?;
        let mut report = ScanReport::new(LoopKind::Rule, rules.len());
        for rule in &rules {
            report.record(rule.id, guarded(self.fire_rule(rule, now)).await);
        }
        Ok(report)
    }

    async fn fire_rule(&self, rule: &CollectorRule, now: DateTime<Utc>) -> SchedulerResult<FireOutcome> {
        if !self.evaluator.rule_is_due(rule, now).await? {
            return Ok(FireOutcome::NotDue);
        }

        let next = self.evaluator.rule_next_time(rule, now).await?;
        if !self
            .rule_repo
            .claim_fire(rule.id, rule.last_execute_time, now, next)
            .await?
        {
            return Ok(FireOutcome::Conflict);
        }

        let mut dispatched = 0;
        let mut rejected = 0;
        for &task_id in &rule.task_ids {
            match self.dispatch_member(rule.id, task_id).await {
                Ok(true) => dispatched += 1,
                Ok(false) => {}
                Err(e) => {
                    rejected += 1;
                    warn!(rule_id = rule.id, task_id, error = %e, "规则成员任务派发失败");
                }
            }
        }

        debug!(rule_id = rule.id, dispatched, rejected, "采集规则已触发");
        Ok(FireOutcome::Fired {
            dispatched,
            rejected,
        })
    }

    async fn dispatch_member(&self, rule_id: i64, task_id: i64) -> SchedulerResult<bool> {
        let task = match load_dispatchable_task(self.task_repo.as_ref(), task_id).await? {
            Ok(task) => task,
            Err(reason) => {
                debug!(rule_id, task_id, reason = %reason, "跳过规则成员任务");
                return Ok(false);
            }
        };

        self.dispatcher
            .submit(CollectionJob::new(task, Trigger::rule(rule_id)))?;
        Ok(true)
    }
}
