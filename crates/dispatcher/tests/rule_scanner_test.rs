use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use collector_core::models::{CollectorRule, RuleType, TriggerSource};
use collector_core::traits::RuleRepository;
use collector_dispatcher::rule_scanner::RuleScanner;
use collector_dispatcher::trigger::TriggerEvaluator;
use collector_testing_utils::{
    rule, MockRuleRepository, MockTaskRepository, RecordingDispatcher, TaskBuilder, TestEnv,
};

fn now() -> DateTime<Utc> {
    TestEnv::at(2024, 3, 1, 9, 10, 0)
}

fn tasks(ids: &[i64]) -> MockTaskRepository {
    MockTaskRepository::with_tasks(
        ids.iter()
            .map(|&id| {
                TaskBuilder::new()
                    .with_id(id)
                    .with_code(&format!("task_{id}"))
                    .build()
            })
            .collect(),
    )
}

async fn setup(
    rules: Vec<CollectorRule>,
    task_repo: MockTaskRepository,
    dispatcher: RecordingDispatcher,
) -> (RuleScanner, MockRuleRepository) {
    let rule_repo = MockRuleRepository::new();
    for r in rules {
        rule_repo.create(&r).await.unwrap();
    }
    let scanner = RuleScanner::new(
        Arc::new(rule_repo.clone()),
        Arc::new(task_repo),
        Arc::new(dispatcher),
        Arc::new(TriggerEvaluator::new(Duration::hours(1))),
    );
    (scanner, rule_repo)
}

#[tokio::test]
async fn test_rule_dispatches_every_member() {
    let dispatcher = RecordingDispatcher::new();
    let (scanner, rules) = setup(
        vec![rule(RuleType::Interval, "300", vec![1, 2, 3])],
        tasks(&[1, 2, 3]),
        dispatcher.clone(),
    )
    .await;

    let report = scanner.scan(now()).await.unwrap();
    assert_eq!(report.fired, 1);
    assert_eq!(report.dispatched, 3);
    assert_eq!(dispatcher.task_ids(), vec![1, 2, 3]);
    assert!(dispatcher.jobs().iter().all(|job| {
        job.trigger.source == TriggerSource::Rule && job.trigger.rule_id == Some(1)
    }));

    let stored = rules.get(1).unwrap();
    assert_eq!(stored.last_execute_time, Some(now()));
    assert_eq!(stored.next_execute_time, Some(now() + Duration::seconds(300)));
}

#[tokio::test]
async fn test_interval_rule_waits_for_period() {
    let dispatcher = RecordingDispatcher::new();
    let (scanner, _rules) = setup(
        vec![rule(RuleType::Interval, "300", vec![1])],
        tasks(&[1]),
        dispatcher.clone(),
    )
    .await;

    scanner.scan(now()).await.unwrap();
    scanner.scan(now() + Duration::seconds(299)).await.unwrap();
    assert_eq!(dispatcher.jobs().len(), 1);

    scanner.scan(now() + Duration::seconds(300)).await.unwrap();
    assert_eq!(dispatcher.jobs().len(), 2);
}

#[tokio::test]
async fn test_rejected_member_does_not_block_rest() {
    // 成员2已禁用，成员99不存在，执行池只能容纳两个作业
    let task_repo = MockTaskRepository::with_tasks(vec![
        TaskBuilder::new().with_id(1).with_code("a").build(),
        TaskBuilder::new().with_id(2).with_code("b").disabled().build(),
        TaskBuilder::new().with_id(3).with_code("c").build(),
        TaskBuilder::new().with_id(4).with_code("d").build(),
    ]);
    let dispatcher = RecordingDispatcher::with_capacity(2);
    let (scanner, rules) = setup(
        vec![rule(RuleType::Interval, "60", vec![1, 2, 99, 3, 4])],
        task_repo,
        dispatcher.clone(),
    )
    .await;

    let report = scanner.scan(now()).await.unwrap();
    assert_eq!(report.fired, 1);
    assert_eq!(report.dispatched, 2);
    assert_eq!(report.rejected, 1);
    assert_eq!(report.failures, 0);
    assert_eq!(dispatcher.task_ids(), vec![1, 3]);

    assert_eq!(rules.get(1).unwrap().last_execute_time, Some(now()));
}

#[tokio::test]
async fn test_fixed_time_rule() {
    let dispatcher = RecordingDispatcher::new();
    let (scanner, rules) = setup(
        vec![
            rule(RuleType::FixedTime, "09:00:00", vec![1]),
            rule(RuleType::FixedTime, "10:00:00", vec![1]),
        ],
        tasks(&[1]),
        dispatcher.clone(),
    )
    .await;

    let report = scanner.scan(now()).await.unwrap();
    assert_eq!(report.candidates, 2);
    assert_eq!(report.fired, 1);
    assert_eq!(dispatcher.jobs()[0].trigger.rule_id, Some(1));
    assert_eq!(
        rules.get(1).unwrap().next_execute_time,
        Some(TestEnv::at(2024, 3, 2, 9, 0, 0))
    );

    // 第一条规则当天不会再次触发
    scanner.scan(now() + Duration::hours(1)).await.unwrap();
    let fired: Vec<_> = dispatcher
        .jobs()
        .iter()
        .filter_map(|job| job.trigger.rule_id)
        .collect();
    assert_eq!(fired, vec![1, 2]);
}

#[tokio::test]
async fn test_cron_rule_and_disabled_rule() {
    let mut disabled = rule(RuleType::Cron, "0 0 9 * * *", vec![1]);
    disabled.enabled = false;
    let dispatcher = RecordingDispatcher::new();
    let (scanner, _rules) = setup(
        vec![rule(RuleType::Cron, "0 0 9 * * *", vec![1]), disabled],
        tasks(&[1]),
        dispatcher.clone(),
    )
    .await;

    let report = scanner.scan(now()).await.unwrap();
    assert_eq!(report.candidates, 1);
    assert_eq!(report.fired, 1);
    assert_eq!(dispatcher.jobs().len(), 1);
}

#[tokio::test]
async fn test_invalid_rule_does_not_stop_scan() {
    let mut broken = rule(RuleType::Interval, "300", vec![1]);
    broken.expression = "soon".to_string();
    let dispatcher = RecordingDispatcher::new();
    let (scanner, _rules) = setup(
        vec![broken, rule(RuleType::Interval, "300", vec![1])],
        tasks(&[1]),
        dispatcher.clone(),
    )
    .await;

    let report = scanner.scan(now()).await.unwrap();
    assert_eq!(report.failures, 1);
    assert_eq!(report.fired, 1);
    assert_eq!(dispatcher.jobs()[0].trigger.rule_id, Some(2));
}
