//! Mock implementations for all repository and service traits
//!
//! In-memory doubles that follow the same due-time predicates and
//! compare-and-set claim semantics as the SQLite repositories, so scheduler
//! and executor tests can run without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use collector_core::models::{
    AssetInfo, CollectorRule, CollectorTask, ConnectionParams, InstanceOutcome, InstanceStatus,
    MetricData, MetricDefinition, MetricProtocolMapping, ScheduleType, TaskInstance,
    TaskSchedule, TaskStatus,
};
use collector_core::traits::{
    AssetService, CollectionJob, InstanceRepository, MetricCatalogRepository, MetricSink,
    RuleRepository, ScheduleRepository, TaskDispatcher, TaskRepository,
};
use collector_core::{SchedulerError, SchedulerResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

fn sorted<T: Clone>(map: &HashMap<i64, T>) -> Vec<T> {
    let mut ids: Vec<&i64> = map.keys().collect();
    ids.sort();
    ids.into_iter().map(|id| map[id].clone()).collect()
}

/// Mock implementation of TaskRepository for testing
#[derive(Debug, Clone)]
pub struct MockTaskRepository {
    tasks: Arc<Mutex<HashMap<i64, CollectorTask>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MockTaskRepository {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    pub fn with_tasks(tasks: Vec<CollectorTask>) -> Self {
        let mut task_map = HashMap::new();
        let mut max_id = 0;

        for task in tasks {
            if task.id > max_id {
                max_id = task.id;
            }
            task_map.insert(task.id, task);
        }

        Self {
            tasks: Arc::new(Mutex::new(task_map)),
            next_id: Arc::new(Mutex::new(max_id + 1)),
        }
    }

    pub fn count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn get(&self, id: i64) -> Option<CollectorTask> {
        self.tasks.lock().unwrap().get(&id).cloned()
    }
}

impl Default for MockTaskRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskRepository for MockTaskRepository {
    async fn create(&self, task: &CollectorTask) -> SchedulerResult<CollectorTask> {
        let mut tasks = self.tasks.lock().unwrap();
        if tasks.values().any(|t| t.code == task.code) {
            return Err(SchedulerError::DuplicateTaskCode {
                code: task.code.clone(),
            });
        }
        let mut next_id = self.next_id.lock().unwrap();

        let mut new_task = task.clone();
        new_task.id = *next_id;
        *next_id += 1;

        tasks.insert(new_task.id, new_task.clone());
        Ok(new_task)
    }

    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<CollectorTask>> {
        Ok(self.tasks.lock().unwrap().get(&id).cloned())
    }

    async fn get_by_code(&self, code: &str) -> SchedulerResult<Option<CollectorTask>> {
        let tasks = self.tasks.lock().unwrap();
        Ok(tasks.values().find(|t| t.code == code).cloned())
    }

    async fn update(&self, task: &CollectorTask) -> SchedulerResult<()> {
        let mut tasks = self.tasks.lock().unwrap();
        if !tasks.contains_key(&task.id) {
            return Err(SchedulerError::TaskNotFound { id: task.id });
        }
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn delete(&self, id: i64) -> SchedulerResult<()> {
        self.tasks
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or(SchedulerError::TaskNotFound { id })
    }

    async fn list(&self) -> SchedulerResult<Vec<CollectorTask>> {
        Ok(sorted(&self.tasks.lock().unwrap()))
    }

    async fn find_due_interval_tasks(
        &self,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Vec<CollectorTask>> {
        let tasks = sorted(&self.tasks.lock().unwrap());
        Ok(tasks.into_iter().filter(|t| t.is_interval_due(now)).collect())
    }

    async fn claim_interval(
        &self,
        id: i64,
        expected_last: Option<DateTime<Utc>>,
        fired_at: DateTime<Utc>,
    ) -> SchedulerResult<bool> {
        let mut tasks = self.tasks.lock().unwrap();
        match tasks.get_mut(&id) {
            Some(task)
                if task.status == TaskStatus::Enabled
                    && task.last_execute_time == expected_last =>
            {
                task.last_execute_time = Some(fired_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_last_execution(
        &self,
        id: i64,
        executed_at: DateTime<Utc>,
        status: InstanceStatus,
    ) -> SchedulerResult<()> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(&id)
            .ok_or(SchedulerError::TaskNotFound { id })?;
        task.last_execute_time = Some(executed_at);
        task.last_execute_status = Some(status);
        Ok(())
    }
}

/// Mock implementation of ScheduleRepository for testing
#[derive(Debug, Clone)]
pub struct MockScheduleRepository {
    schedules: Arc<Mutex<HashMap<i64, TaskSchedule>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MockScheduleRepository {
    pub fn new() -> Self {
        Self {
            schedules: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    pub fn with_schedules(schedules: Vec<TaskSchedule>) -> Self {
        let max_id = schedules.iter().map(|s| s.id).max().unwrap_or(0);
        Self {
            schedules: Arc::new(Mutex::new(
                schedules.into_iter().map(|s| (s.id, s)).collect(),
            )),
            next_id: Arc::new(Mutex::new(max_id + 1)),
        }
    }

    pub fn get(&self, id: i64) -> Option<TaskSchedule> {
        self.schedules.lock().unwrap().get(&id).cloned()
    }

    fn enabled_of_type(&self, schedule_type: ScheduleType) -> Vec<TaskSchedule> {
        sorted(&self.schedules.lock().unwrap())
            .into_iter()
            .filter(|s| s.enabled && s.schedule_type == schedule_type)
            .collect()
    }
}

impl Default for MockScheduleRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScheduleRepository for MockScheduleRepository {
    async fn create(&self, schedule: &TaskSchedule) -> SchedulerResult<TaskSchedule> {
        let mut schedules = self.schedules.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();

        let mut new_schedule = schedule.clone();
        new_schedule.id = *next_id;
        *next_id += 1;

        schedules.insert(new_schedule.id, new_schedule.clone());
        Ok(new_schedule)
    }

    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<TaskSchedule>> {
        Ok(self.get(id))
    }

    async fn update(&self, schedule: &TaskSchedule) -> SchedulerResult<()> {
        let mut schedules = self.schedules.lock().unwrap();
        let existing = schedules
            .get_mut(&schedule.id)
            .ok_or(SchedulerError::ScheduleNotFound { id: schedule.id })?;
        // 与SQLite实现一致，更新不修改最近执行时间
        let last_execute_time = existing.last_execute_time;
        *existing = schedule.clone();
        existing.last_execute_time = last_execute_time;
        Ok(())
    }

    async fn delete(&self, id: i64) -> SchedulerResult<()> {
        self.schedules
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or(SchedulerError::ScheduleNotFound { id })
    }

    async fn list(&self) -> SchedulerResult<Vec<TaskSchedule>> {
        Ok(sorted(&self.schedules.lock().unwrap()))
    }

    async fn list_by_task(&self, task_id: i64) -> SchedulerResult<Vec<TaskSchedule>> {
        Ok(sorted(&self.schedules.lock().unwrap())
            .into_iter()
            .filter(|s| s.task_id == task_id)
            .collect())
    }

    async fn find_due_fixed_rate(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<TaskSchedule>> {
        Ok(self
            .enabled_of_type(ScheduleType::FixedRate)
            .into_iter()
            .filter(|s| s.is_fixed_rate_due(now))
            .collect())
    }

    async fn find_due_one_shot(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<TaskSchedule>> {
        Ok(self
            .enabled_of_type(ScheduleType::OneShot)
            .into_iter()
            .filter(|s| s.is_one_shot_due(now))
            .collect())
    }

    async fn find_cron_in_window(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<TaskSchedule>> {
        Ok(self
            .enabled_of_type(ScheduleType::Cron)
            .into_iter()
            .filter(|s| s.is_within_window(now))
            .collect())
    }

    async fn claim_fire(
        &self,
        id: i64,
        expected_last: Option<DateTime<Utc>>,
        fired_at: DateTime<Utc>,
        next_execute_time: Option<DateTime<Utc>>,
    ) -> SchedulerResult<bool> {
        let mut schedules = self.schedules.lock().unwrap();
        match schedules.get_mut(&id) {
            Some(s) if s.enabled && s.last_execute_time == expected_last => {
                s.last_execute_time = Some(fired_at);
                s.next_execute_time = next_execute_time;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn claim_one_shot(&self, id: i64, fired_at: DateTime<Utc>) -> SchedulerResult<bool> {
        let mut schedules = self.schedules.lock().unwrap();
        match schedules.get_mut(&id) {
            Some(s) if s.enabled && s.last_execute_time.is_none() => {
                s.last_execute_time = Some(fired_at);
                s.next_execute_time = None;
                s.enabled = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_enabled(
        &self,
        id: i64,
        enabled: bool,
        next_execute_time: Option<DateTime<Utc>>,
    ) -> SchedulerResult<()> {
        let mut schedules = self.schedules.lock().unwrap();
        let s = schedules
            .get_mut(&id)
            .ok_or(SchedulerError::ScheduleNotFound { id })?;
        s.enabled = enabled;
        s.next_execute_time = next_execute_time;
        Ok(())
    }

    async fn touch_last_execute_time(&self, id: i64, at: DateTime<Utc>) -> SchedulerResult<()> {
        let mut schedules = self.schedules.lock().unwrap();
        let s = schedules
            .get_mut(&id)
            .ok_or(SchedulerError::ScheduleNotFound { id })?;
        s.last_execute_time = Some(at);
        Ok(())
    }
}

/// Mock implementation of RuleRepository for testing
#[derive(Debug, Clone)]
pub struct MockRuleRepository {
    rules: Arc<Mutex<HashMap<i64, CollectorRule>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MockRuleRepository {
    pub fn new() -> Self {
        Self {
            rules: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    pub fn get(&self, id: i64) -> Option<CollectorRule> {
        self.rules.lock().unwrap().get(&id).cloned()
    }
}

impl Default for MockRuleRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuleRepository for MockRuleRepository {
    async fn create(&self, rule: &CollectorRule) -> SchedulerResult<CollectorRule> {
        let mut rules = self.rules.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();

        let mut new_rule = rule.clone();
        new_rule.id = *next_id;
        *next_id += 1;

        rules.insert(new_rule.id, new_rule.clone());
        Ok(new_rule)
    }

    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<CollectorRule>> {
        Ok(self.get(id))
    }

    async fn update(&self, rule: &CollectorRule) -> SchedulerResult<()> {
        let mut rules = self.rules.lock().unwrap();
        let existing = rules
            .get_mut(&rule.id)
            .ok_or(SchedulerError::RuleNotFound { id: rule.id })?;
        let last_execute_time = existing.last_execute_time;
        *existing = rule.clone();
        existing.last_execute_time = last_execute_time;
        Ok(())
    }

    async fn delete(&self, id: i64) -> SchedulerResult<()> {
        self.rules
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or(SchedulerError::RuleNotFound { id })
    }

    async fn list(&self) -> SchedulerResult<Vec<CollectorRule>> {
        Ok(sorted(&self.rules.lock().unwrap()))
    }

    async fn find_enabled(&self) -> SchedulerResult<Vec<CollectorRule>> {
        Ok(sorted(&self.rules.lock().unwrap())
            .into_iter()
            .filter(|r| r.enabled)
            .collect())
    }

    async fn claim_fire(
        &self,
        id: i64,
        expected_last: Option<DateTime<Utc>>,
        fired_at: DateTime<Utc>,
        next_execute_time: Option<DateTime<Utc>>,
    ) -> SchedulerResult<bool> {
        let mut rules = self.rules.lock().unwrap();
        match rules.get_mut(&id) {
            Some(r) if r.enabled && r.last_execute_time == expected_last => {
                r.last_execute_time = Some(fired_at);
                r.next_execute_time = next_execute_time;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_enabled(
        &self,
        id: i64,
        enabled: bool,
        next_execute_time: Option<DateTime<Utc>>,
    ) -> SchedulerResult<()> {
        let mut rules = self.rules.lock().unwrap();
        let r = rules.get_mut(&id).ok_or(SchedulerError::RuleNotFound { id })?;
        r.enabled = enabled;
        r.next_execute_time = next_execute_time;
        Ok(())
    }
}

/// Mock implementation of InstanceRepository for testing
#[derive(Debug, Clone)]
pub struct MockInstanceRepository {
    instances: Arc<Mutex<HashMap<i64, TaskInstance>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MockInstanceRepository {
    pub fn new() -> Self {
        Self {
            instances: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    pub fn count(&self) -> usize {
        self.instances.lock().unwrap().len()
    }

    pub fn get_all_instances(&self) -> Vec<TaskInstance> {
        sorted(&self.instances.lock().unwrap())
    }

    pub fn instances_for_task(&self, task_id: i64) -> Vec<TaskInstance> {
        self.get_all_instances()
            .into_iter()
            .filter(|i| i.task_id == task_id)
            .collect()
    }
}

impl Default for MockInstanceRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstanceRepository for MockInstanceRepository {
    async fn create(&self, instance: &TaskInstance) -> SchedulerResult<TaskInstance> {
        let mut instances = self.instances.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();

        let mut new_instance = instance.clone();
        new_instance.id = *next_id;
        *next_id += 1;

        instances.insert(new_instance.id, new_instance.clone());
        Ok(new_instance)
    }

    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<TaskInstance>> {
        Ok(self.instances.lock().unwrap().get(&id).cloned())
    }

    async fn finish(&self, id: i64, outcome: &InstanceOutcome) -> SchedulerResult<TaskInstance> {
        let mut instances = self.instances.lock().unwrap();
        let instance = instances
            .get_mut(&id)
            .ok_or(SchedulerError::InstanceNotFound { id })?;
        instance.finish(outcome)?;
        Ok(instance.clone())
    }

    async fn list_by_task(&self, task_id: i64, limit: i64) -> SchedulerResult<Vec<TaskInstance>> {
        let mut instances = self.instances_for_task(task_id);
        instances.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)));
        instances.truncate(limit.max(0) as usize);
        Ok(instances)
    }
}

/// Mock implementation of MetricCatalogRepository for testing
#[derive(Debug, Clone, Default)]
pub struct MockMetricCatalogRepository {
    definitions: Arc<Mutex<HashMap<i64, MetricDefinition>>>,
    mappings: Arc<Mutex<Vec<MetricProtocolMapping>>>,
}

impl MockMetricCatalogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同时注册指标定义及其协议映射
    pub fn with_metric(self, definition: MetricDefinition, mapping: MetricProtocolMapping) -> Self {
        self.definitions
            .lock()
            .unwrap()
            .insert(definition.id, definition);
        self.mappings.lock().unwrap().push(mapping);
        self
    }

    pub fn with_definition(self, definition: MetricDefinition) -> Self {
        self.definitions
            .lock()
            .unwrap()
            .insert(definition.id, definition);
        self
    }
}

#[async_trait]
impl MetricCatalogRepository for MockMetricCatalogRepository {
    async fn upsert_definition(&self, definition: &MetricDefinition) -> SchedulerResult<()> {
        self.definitions
            .lock()
            .unwrap()
            .insert(definition.id, definition.clone());
        Ok(())
    }

    async fn upsert_mapping(&self, mapping: &MetricProtocolMapping) -> SchedulerResult<()> {
        let mut mappings = self.mappings.lock().unwrap();
        mappings.retain(|m| {
            !(m.metric_id == mapping.metric_id && m.protocol.eq_ignore_ascii_case(&mapping.protocol))
        });
        mappings.push(mapping.clone());
        Ok(())
    }

    async fn get_definitions(&self, ids: &[i64]) -> SchedulerResult<Vec<MetricDefinition>> {
        let definitions = self.definitions.lock().unwrap();
        let mut seen = Vec::new();
        Ok(ids
            .iter()
            .filter(|id| {
                if seen.contains(*id) {
                    return false;
                }
                seen.push(**id);
                true
            })
            .filter_map(|id| definitions.get(id))
            .filter(|d| d.enabled)
            .cloned()
            .collect())
    }

    async fn get_mappings(
        &self,
        metric_ids: &[i64],
        protocol: &str,
    ) -> SchedulerResult<Vec<MetricProtocolMapping>> {
        Ok(self
            .mappings
            .lock()
            .unwrap()
            .iter()
            .filter(|m| metric_ids.contains(&m.metric_id) && m.protocol.eq_ignore_ascii_case(protocol))
            .cloned()
            .collect())
    }
}

/// 资产服务的测试替身
#[derive(Debug, Clone, Default)]
pub struct MockAssetService {
    assets: Arc<Mutex<HashMap<i64, (AssetInfo, ConnectionParams)>>>,
    unavailable: Arc<Mutex<bool>>,
}

impl MockAssetService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(self, info: AssetInfo, params: ConnectionParams) -> Self {
        self.assets.lock().unwrap().insert(info.id, (info, params));
        self
    }

    /// 模拟资产服务不可达
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    fn check_available(&self) -> SchedulerResult<()> {
        if *self.unavailable.lock().unwrap() {
            return Err(SchedulerError::TransientIo("资产服务不可达".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AssetService for MockAssetService {
    async fn get_asset_basic_info(&self, asset_id: i64) -> SchedulerResult<Option<AssetInfo>> {
        self.check_available()?;
        Ok(self
            .assets
            .lock()
            .unwrap()
            .get(&asset_id)
            .map(|(info, _)| info.clone()))
    }

    async fn get_asset_connection_params(
        &self,
        asset_id: i64,
        _protocol: &str,
    ) -> SchedulerResult<ConnectionParams> {
        self.check_available()?;
        Ok(self
            .assets
            .lock()
            .unwrap()
            .get(&asset_id)
            .map(|(_, params)| params.clone())
            .unwrap_or_default())
    }
}

/// 记录收到的所有指标值和状态通知
#[derive(Debug, Clone, Default)]
pub struct RecordingMetricSink {
    data: Arc<Mutex<Vec<MetricData>>>,
    statuses: Arc<Mutex<Vec<TaskInstance>>>,
    fail_sends: Arc<Mutex<bool>>,
}

impl RecordingMetricSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 发送一律失败的接收端
    pub fn failing() -> Self {
        let sink = Self::default();
        *sink.fail_sends.lock().unwrap() = true;
        sink
    }

    pub fn data(&self) -> Vec<MetricData> {
        self.data.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<TaskInstance> {
        self.statuses.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetricSink for RecordingMetricSink {
    async fn send_metric_data(&self, data: &MetricData) -> SchedulerResult<()> {
        if *self.fail_sends.lock().unwrap() {
            return Err(SchedulerError::TransientIo("下游不可达".to_string()));
        }
        self.data.lock().unwrap().push(data.clone());
        Ok(())
    }

    async fn send_collection_status(&self, instance: &TaskInstance) -> SchedulerResult<()> {
        self.statuses.lock().unwrap().push(instance.clone());
        Ok(())
    }
}

/// 记录提交的作业，可模拟执行池已满
#[derive(Debug, Clone, Default)]
pub struct RecordingDispatcher {
    jobs: Arc<Mutex<Vec<CollectionJob>>>,
    capacity: Arc<Mutex<Option<usize>>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 超过容量后拒绝提交
    pub fn with_capacity(capacity: usize) -> Self {
        let dispatcher = Self::default();
        *dispatcher.capacity.lock().unwrap() = Some(capacity);
        dispatcher
    }

    pub fn jobs(&self) -> Vec<CollectionJob> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn task_ids(&self) -> Vec<i64> {
        self.jobs().iter().map(|j| j.task.id).collect()
    }
}

impl TaskDispatcher for RecordingDispatcher {
    fn submit(&self, job: CollectionJob) -> SchedulerResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(capacity) = *self.capacity.lock().unwrap() {
            if jobs.len() >= capacity {
                return Err(SchedulerError::PoolSaturated {
                    task_id: job.task.id,
                });
            }
        }
        jobs.push(job);
        Ok(())
    }
}
