use async_trait::async_trait;

use crate::{
    models::{CollectorTask, Trigger},
    SchedulerResult,
};

/// 一次待执行的采集
#[derive(Debug, Clone)]
pub struct CollectionJob {
    pub task: CollectorTask,
    pub trigger: Trigger,
}

impl CollectionJob {
    pub fn new(task: CollectorTask, trigger: Trigger) -> Self {
        Self { task, trigger }
    }
}

/// 同步执行入口：在调用方执行，完成后返回实例ID
#[async_trait]
pub trait CollectionExecutor: Send + Sync {
    async fn execute(&self, task: &CollectorTask, trigger: Trigger) -> SchedulerResult<i64>;
}

/// 异步派发入口：立即返回，不阻塞调度循环
///
/// 队列已满时返回 `SchedulerError::PoolSaturated`，不会静默丢弃。
pub trait TaskDispatcher: Send + Sync {
    fn submit(&self, job: CollectionJob) -> SchedulerResult<()>;
}
