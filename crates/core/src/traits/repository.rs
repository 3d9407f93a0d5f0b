//! 数据仓储层接口定义
//!
//! 调度器只依赖以下仓储接口：
//! - `TaskRepository` - 采集任务，调度器只修改最近执行字段
//! - `ScheduleRepository` - 任务调度，包含比较并设置（CAS）的触发占用
//! - `RuleRepository` - 采集规则
//! - `InstanceRepository` - 采集实例，只允许结束一次
//! - `MetricCatalogRepository` - 指标定义与协议映射（只读）
//!
//! ## 到期查询
//!
//! 各个 `find_*` 查询在存储层按启用状态和调度类型过滤，时间条件统一由模型上的
//! 判断方法计算，保证所有存储实现对"到期"的定义一致。
//!
//! ## 触发占用
//!
//! "读取到期项 → 触发 → 写回下次时间" 不是原子操作。派发前必须先调用 `claim_*`：
//! 只有当行的 `last_execute_time` 仍等于扫描时读到的值时更新才会生效，返回 `false`
//! 表示已被其他扫描周期占用，此次不应派发。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    models::{
        CollectorRule, CollectorTask, InstanceOutcome, InstanceStatus, MetricDefinition,
        MetricProtocolMapping, TaskInstance, TaskSchedule,
    },
    SchedulerResult,
};

/// 采集任务仓储接口
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: &CollectorTask) -> SchedulerResult<CollectorTask>;
    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<CollectorTask>>;
    async fn get_by_code(&self, code: &str) -> SchedulerResult<Option<CollectorTask>>;
    async fn update(&self, task: &CollectorTask) -> SchedulerResult<()>;
    async fn delete(&self, id: i64) -> SchedulerResult<()>;
    async fn list(&self) -> SchedulerResult<Vec<CollectorTask>>;
    /// 按任务自身采集间隔到期的启用任务
    async fn find_due_interval_tasks(&self, now: DateTime<Utc>)
        -> SchedulerResult<Vec<CollectorTask>>;
    /// 占用一次按间隔触发，成功时把 `last_execute_time` 设置为 `fired_at`
    async fn claim_interval(
        &self,
        id: i64,
        expected_last: Option<DateTime<Utc>>,
        fired_at: DateTime<Utc>,
    ) -> SchedulerResult<bool>;
    /// 记录最近一次执行结果，并发写入时以最后完成的为准
    async fn update_last_execution(
        &self,
        id: i64,
        executed_at: DateTime<Utc>,
        status: InstanceStatus,
    ) -> SchedulerResult<()>;
}

/// 任务调度仓储接口
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn create(&self, schedule: &TaskSchedule) -> SchedulerResult<TaskSchedule>;
    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<TaskSchedule>>;
    async fn update(&self, schedule: &TaskSchedule) -> SchedulerResult<()>;
    async fn delete(&self, id: i64) -> SchedulerResult<()>;
    async fn list(&self) -> SchedulerResult<Vec<TaskSchedule>>;
    async fn list_by_task(&self, task_id: i64) -> SchedulerResult<Vec<TaskSchedule>>;
    /// 已到期的启用固定频率调度
    async fn find_due_fixed_rate(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<TaskSchedule>>;
    /// 到达执行时间且从未执行过的启用一次性调度
    async fn find_due_one_shot(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<TaskSchedule>>;
    /// 处于有效期内的启用 Cron 调度，是否触发由调用方根据表达式判断
    async fn find_cron_in_window(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<TaskSchedule>>;
    /// 占用一次固定频率或 Cron 触发
    async fn claim_fire(
        &self,
        id: i64,
        expected_last: Option<DateTime<Utc>>,
        fired_at: DateTime<Utc>,
        next_execute_time: Option<DateTime<Utc>>,
    ) -> SchedulerResult<bool>;
    /// 占用一次性调度，成功时同时将其永久禁用
    async fn claim_one_shot(&self, id: i64, fired_at: DateTime<Utc>) -> SchedulerResult<bool>;
    async fn set_enabled(
        &self,
        id: i64,
        enabled: bool,
        next_execute_time: Option<DateTime<Utc>>,
    ) -> SchedulerResult<()>;
    /// 手动执行后记录执行时间
    async fn touch_last_execute_time(&self, id: i64, at: DateTime<Utc>) -> SchedulerResult<()>;
}

/// 采集规则仓储接口
#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn create(&self, rule: &CollectorRule) -> SchedulerResult<CollectorRule>;
    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<CollectorRule>>;
    async fn update(&self, rule: &CollectorRule) -> SchedulerResult<()>;
    async fn delete(&self, id: i64) -> SchedulerResult<()>;
    async fn list(&self) -> SchedulerResult<Vec<CollectorRule>>;
    async fn find_enabled(&self) -> SchedulerResult<Vec<CollectorRule>>;
    async fn claim_fire(
        &self,
        id: i64,
        expected_last: Option<DateTime<Utc>>,
        fired_at: DateTime<Utc>,
        next_execute_time: Option<DateTime<Utc>>,
    ) -> SchedulerResult<bool>;
    async fn set_enabled(
        &self,
        id: i64,
        enabled: bool,
        next_execute_time: Option<DateTime<Utc>>,
    ) -> SchedulerResult<()>;
}

/// 采集实例仓储接口
#[async_trait]
pub trait InstanceRepository: Send + Sync {
    async fn create(&self, instance: &TaskInstance) -> SchedulerResult<TaskInstance>;
    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<TaskInstance>>;
    /// 结束实例，仅对尚未结束的实例生效，否则返回 `InstanceAlreadyFinished`
    async fn finish(&self, id: i64, outcome: &InstanceOutcome) -> SchedulerResult<TaskInstance>;
    async fn list_by_task(&self, task_id: i64, limit: i64) -> SchedulerResult<Vec<TaskInstance>>;
}

/// 指标目录仓储接口
#[async_trait]
pub trait MetricCatalogRepository: Send + Sync {
    async fn upsert_definition(&self, definition: &MetricDefinition) -> SchedulerResult<()>;
    async fn upsert_mapping(&self, mapping: &MetricProtocolMapping) -> SchedulerResult<()>;
    /// 按ID加载启用的指标定义，保持请求的顺序
    async fn get_definitions(&self, ids: &[i64]) -> SchedulerResult<Vec<MetricDefinition>>;
    /// 加载指定协议下的协议映射，协议名不区分大小写
    async fn get_mappings(
        &self,
        metric_ids: &[i64],
        protocol: &str,
    ) -> SchedulerResult<Vec<MetricProtocolMapping>>;
}
