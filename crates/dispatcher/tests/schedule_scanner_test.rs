use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use collector_core::models::{ScheduleType, TaskSchedule, TriggerSource};
use collector_core::traits::ScheduleRepository;
use collector_core::{SchedulerError, SchedulerResult};
use collector_dispatcher::schedule_scanner::ScheduleScanner;
use collector_dispatcher::trigger::TriggerEvaluator;
use collector_testing_utils::{
    MockScheduleRepository, MockTaskRepository, RecordingDispatcher, ScheduleBuilder, TaskBuilder,
    TestEnv,
};

fn t0() -> DateTime<Utc> {
    TestEnv::at(2024, 3, 1, 12, 0, 0)
}

fn scanner(
    schedules: Arc<dyn ScheduleRepository>,
    tasks: MockTaskRepository,
    dispatcher: RecordingDispatcher,
) -> ScheduleScanner {
    ScheduleScanner::new(
        schedules,
        Arc::new(tasks),
        Arc::new(dispatcher),
        Arc::new(TriggerEvaluator::new(Duration::hours(1))),
    )
}

fn one_task() -> MockTaskRepository {
    MockTaskRepository::with_tasks(vec![TaskBuilder::new().with_id(1).build()])
}

#[tokio::test]
async fn test_oversized_fixed_rate_fails_alone() {
    let schedules = MockScheduleRepository::with_schedules(vec![
        ScheduleBuilder::fixed_rate(1, 10_000_000_000_000).with_id(10).build(),
        ScheduleBuilder::fixed_rate(1, 60).with_id(11).build(),
    ]);
    let dispatcher = RecordingDispatcher::new();
    let scanner = scanner(Arc::new(schedules.clone()), one_task(), dispatcher.clone());

    let report = scanner.scan_fixed_rate(t0()).await.unwrap();
    assert_eq!(report.candidates, 2);
    assert_eq!(report.fired, 1);
    assert_eq!(report.failures, 1);
    assert_eq!(dispatcher.jobs().len(), 1);
    assert_eq!(schedules.get(10).unwrap().last_execute_time, None);
    assert_eq!(schedules.get(11).unwrap().last_execute_time, Some(t0()));
}

#[tokio::test]
async fn test_fixed_rate_fires_once_per_period() {
    let schedules = MockScheduleRepository::with_schedules(vec![
        ScheduleBuilder::fixed_rate(1, 60).with_id(10).build(),
    ]);
    let dispatcher = RecordingDispatcher::new();
    let scanner = scanner(Arc::new(schedules.clone()), one_task(), dispatcher.clone());

    let report = scanner.scan_fixed_rate(t0()).await.unwrap();
    assert_eq!(report.fired, 1);
    assert_eq!(report.dispatched, 1);

    let stored = schedules.get(10).unwrap();
    assert_eq!(stored.last_execute_time, Some(t0()));
    assert_eq!(stored.next_execute_time, Some(t0() + Duration::seconds(60)));

    // 周期内再次扫描不触发
    let report = scanner
        .scan_fixed_rate(t0() + Duration::seconds(30))
        .await
        .unwrap();
    assert_eq!(report.candidates, 0);
    assert_eq!(dispatcher.jobs().len(), 1);

    scanner
        .scan_fixed_rate(t0() + Duration::seconds(60))
        .await
        .unwrap();
    let jobs = dispatcher.jobs();
    assert_eq!(jobs.len(), 2);
    assert!(jobs
        .iter()
        .all(|job| job.trigger.source == TriggerSource::FixedRate
            && job.trigger.schedule_id == Some(10)));
}

#[tokio::test]
async fn test_fixed_rate_respects_window() {
    let schedules = MockScheduleRepository::with_schedules(vec![
        ScheduleBuilder::fixed_rate(1, 60)
            .with_id(10)
            .with_window(Some(t0() + Duration::minutes(10)), None)
            .build(),
        ScheduleBuilder::fixed_rate(1, 60)
            .with_id(11)
            .with_window(None, Some(t0() - Duration::minutes(1)))
            .build(),
    ]);
    let dispatcher = RecordingDispatcher::new();
    let scanner = scanner(Arc::new(schedules.clone()), one_task(), dispatcher.clone());

    let report = scanner.scan_fixed_rate(t0()).await.unwrap();
    assert_eq!(report.fired, 0);
    assert!(dispatcher.jobs().is_empty());

    // 到达开始时间后触发，已过结束时间的调度始终不触发
    scanner
        .scan_fixed_rate(t0() + Duration::minutes(10))
        .await
        .unwrap();
    assert_eq!(dispatcher.jobs().len(), 1);
    assert_eq!(dispatcher.jobs()[0].trigger.schedule_id, Some(10));
}

#[tokio::test]
async fn test_fixed_rate_next_time_clamped_to_window_end() {
    let schedules = MockScheduleRepository::with_schedules(vec![ScheduleBuilder::fixed_rate(1, 600)
        .with_id(10)
        .with_window(None, Some(t0() + Duration::minutes(5)))
        .build()]);
    let scanner = scanner(
        Arc::new(schedules.clone()),
        one_task(),
        RecordingDispatcher::new(),
    );

    scanner.scan_fixed_rate(t0()).await.unwrap();
    assert_eq!(schedules.get(10).unwrap().next_execute_time, None);
}

#[tokio::test]
async fn test_disabled_task_is_skipped_without_claim() {
    let tasks = MockTaskRepository::with_tasks(vec![TaskBuilder::new().with_id(1).disabled().build()]);
    let schedules = MockScheduleRepository::with_schedules(vec![
        ScheduleBuilder::fixed_rate(1, 60).with_id(10).build(),
    ]);
    let dispatcher = RecordingDispatcher::new();
    let scanner = scanner(Arc::new(schedules.clone()), tasks, dispatcher.clone());

    let report = scanner.scan_fixed_rate(t0()).await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.fired, 0);
    assert!(dispatcher.jobs().is_empty());
    assert!(schedules.get(10).unwrap().last_execute_time.is_none());
}

#[tokio::test]
async fn test_missing_task_is_skipped() {
    let schedules = MockScheduleRepository::with_schedules(vec![
        ScheduleBuilder::fixed_rate(42, 60).with_id(10).build(),
    ]);
    let scanner = scanner(
        Arc::new(schedules),
        MockTaskRepository::new(),
        RecordingDispatcher::new(),
    );

    let report = scanner.scan_fixed_rate(t0()).await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failures, 0);
}

#[tokio::test]
async fn test_one_shot_fires_exactly_once() {
    let schedules = MockScheduleRepository::with_schedules(vec![
        ScheduleBuilder::one_shot(1, t0()).with_id(20).build(),
    ]);
    let dispatcher = RecordingDispatcher::new();
    let scanner = scanner(Arc::new(schedules.clone()), one_task(), dispatcher.clone());

    let early = scanner
        .scan_one_shot(t0() - Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(early.candidates, 0);

    let report = scanner.scan_one_shot(t0()).await.unwrap();
    assert_eq!(report.fired, 1);

    let stored = schedules.get(20).unwrap();
    assert!(!stored.enabled);
    assert_eq!(stored.last_execute_time, Some(t0()));
    assert_eq!(stored.next_execute_time, None);

    scanner
        .scan_one_shot(t0() + Duration::minutes(5))
        .await
        .unwrap();
    let jobs = dispatcher.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].trigger.source, TriggerSource::OneShot);
}

#[tokio::test]
async fn test_cron_fires_only_after_occurrence() {
    // 每小时整点
    let now = TestEnv::at(2024, 3, 1, 12, 59, 0);
    let schedules = MockScheduleRepository::with_schedules(vec![
        ScheduleBuilder::cron(1, "0 0 * * * *")
            .with_id(30)
            .with_last_execute_time(now - Duration::minutes(59))
            .build(),
        ScheduleBuilder::cron(1, "0 0 * * * *")
            .with_id(31)
            .with_last_execute_time(now - Duration::minutes(61))
            .build(),
    ]);
    let dispatcher = RecordingDispatcher::new();
    let scanner = scanner(Arc::new(schedules.clone()), one_task(), dispatcher.clone());

    let report = scanner.scan_cron(now).await.unwrap();
    assert_eq!(report.candidates, 2);
    assert_eq!(report.fired, 1);

    let jobs = dispatcher.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].trigger.schedule_id, Some(31));
    assert_eq!(jobs[0].trigger.source, TriggerSource::Cron);

    let fired = schedules.get(31).unwrap();
    assert_eq!(fired.last_execute_time, Some(now));
    assert_eq!(fired.next_execute_time, Some(TestEnv::at(2024, 3, 1, 13, 0, 0)));

    // 同一触发点不会重复触发
    scanner
        .scan_cron(now + Duration::seconds(30))
        .await
        .unwrap();
    assert_eq!(dispatcher.jobs().len(), 1);
}

#[tokio::test]
async fn test_cron_first_run_within_lookback() {
    let now = TestEnv::at(2024, 3, 1, 12, 20, 0);
    let schedules = MockScheduleRepository::with_schedules(vec![
        ScheduleBuilder::cron(1, "0 0 * * * *").with_id(30).build(),
    ]);
    let dispatcher = RecordingDispatcher::new();
    let scanner = scanner(Arc::new(schedules), one_task(), dispatcher.clone());

    scanner.scan_cron(now).await.unwrap();
    assert_eq!(dispatcher.jobs().len(), 1);
}

#[tokio::test]
async fn test_invalid_cron_is_counted_as_failure() {
    let schedules = MockScheduleRepository::with_schedules(vec![
        ScheduleBuilder::cron(1, "not a cron").with_id(30).build(),
        ScheduleBuilder::cron(1, "0 0 * * * *").with_id(31).build(),
    ]);
    let dispatcher = RecordingDispatcher::new();
    let scanner = scanner(Arc::new(schedules), one_task(), dispatcher.clone());

    let report = scanner
        .scan_cron(TestEnv::at(2024, 3, 1, 12, 20, 0))
        .await
        .unwrap();
    assert_eq!(report.failures, 1);
    assert_eq!(report.fired, 1);
}

#[tokio::test]
async fn test_saturated_dispatcher_counts_failure() {
    let schedules = MockScheduleRepository::with_schedules(vec![
        ScheduleBuilder::fixed_rate(1, 60).with_id(10).build(),
        ScheduleBuilder::fixed_rate(1, 60).with_id(11).build(),
    ]);
    let dispatcher = RecordingDispatcher::with_capacity(1);
    let scanner = scanner(Arc::new(schedules.clone()), one_task(), dispatcher.clone());

    let report = scanner.scan_fixed_rate(t0()).await.unwrap();
    assert_eq!(report.fired, 1);
    assert_eq!(report.failures, 1);
    assert_eq!(dispatcher.jobs().len(), 1);

    // 占用已提交，这次触发不会被补发
    assert_eq!(schedules.get(11).unwrap().last_execute_time, Some(t0()));
}

/// 查询返回扫描开始前的快照，模拟另一个扫描周期已经占用了调度
struct StaleReads {
    inner: MockScheduleRepository,
    snapshot: Vec<TaskSchedule>,
}

#[async_trait]
impl ScheduleRepository for StaleReads {
    async fn create(&self, schedule: &TaskSchedule) -> SchedulerResult<TaskSchedule> {
        self.inner.create(schedule).await
    }

    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<TaskSchedule>> {
        self.inner.get_by_id(id).await
    }

    async fn update(&self, schedule: &TaskSchedule) -> SchedulerResult<()> {
        self.inner.update(schedule).await
    }

    async fn delete(&self, id: i64) -> SchedulerResult<()> {
        self.inner.delete(id).await
    }

    async fn list(&self) -> SchedulerResult<Vec<TaskSchedule>> {
        self.inner.list().await
    }

    async fn list_by_task(&self, task_id: i64) -> SchedulerResult<Vec<TaskSchedule>> {
        self.inner.list_by_task(task_id).await
    }

    async fn find_due_fixed_rate(&self, _now: DateTime<Utc>) -> SchedulerResult<Vec<TaskSchedule>> {
        Ok(self
            .snapshot
            .iter()
            .filter(|s| s.schedule_type == ScheduleType::FixedRate)
            .cloned()
            .collect())
    }

    async fn find_due_one_shot(&self, _now: DateTime<Utc>) -> SchedulerResult<Vec<TaskSchedule>> {
        Ok(self
            .snapshot
            .iter()
            .filter(|s| s.schedule_type == ScheduleType::OneShot)
            .cloned()
            .collect())
    }

    async fn find_cron_in_window(&self, _now: DateTime<Utc>) -> SchedulerResult<Vec<TaskSchedule>> {
        Err(SchedulerError::Internal("not used".to_string()))
    }

    async fn claim_fire(
        &self,
        id: i64,
        expected_last: Option<DateTime<Utc>>,
        fired_at: DateTime<Utc>,
        next_execute_time: Option<DateTime<Utc>>,
    ) -> SchedulerResult<bool> {
        self.inner
            .claim_fire(id, expected_last, fired_at, next_execute_time)
            .await
    }

    async fn claim_one_shot(&self, id: i64, fired_at: DateTime<Utc>) -> SchedulerResult<bool> {
        self.inner.claim_one_shot(id, fired_at).await
    }

    async fn set_enabled(
        &self,
        id: i64,
        enabled: bool,
        next_execute_time: Option<DateTime<Utc>>,
    ) -> SchedulerResult<()> {
        self.inner.set_enabled(id, enabled, next_execute_time).await
    }

    async fn touch_last_execute_time(&self, id: i64, at: DateTime<Utc>) -> SchedulerResult<()> {
        self.inner.touch_last_execute_time(id, at).await
    }
}

#[tokio::test]
async fn test_overlapping_scan_loses_claim() {
    let fixed = ScheduleBuilder::fixed_rate(1, 60).with_id(10).build();
    let once = ScheduleBuilder::one_shot(1, t0()).with_id(20).build();
    let inner = MockScheduleRepository::with_schedules(vec![fixed.clone(), once.clone()]);
    let stale = StaleReads {
        inner: inner.clone(),
        snapshot: vec![fixed, once],
    };

    let dispatcher = RecordingDispatcher::new();
    let winner = scanner(Arc::new(inner), one_task(), dispatcher.clone());
    let loser = scanner(Arc::new(stale), one_task(), dispatcher.clone());

    winner.scan_fixed_rate(t0()).await.unwrap();
    winner.scan_one_shot(t0()).await.unwrap();
    assert_eq!(dispatcher.jobs().len(), 2);

    let fixed_report = loser.scan_fixed_rate(t0()).await.unwrap();
    let one_shot_report = loser.scan_one_shot(t0()).await.unwrap();
    assert_eq!(fixed_report.conflicts, 1);
    assert_eq!(one_shot_report.conflicts, 1);
    assert_eq!(dispatcher.jobs().len(), 2);
}
