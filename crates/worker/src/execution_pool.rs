//! 有界执行池
//!
//! 调度循环通过 `TaskDispatcher::submit` 投递作业，投递立即返回。
//! 队列满时拒绝并返回 `PoolSaturated`，由调用方记录日志。

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use metrics::counter;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use collector_core::config::ExecutorConfig;
use collector_core::traits::{CollectionExecutor, CollectionJob, TaskDispatcher};
use collector_core::{SchedulerError, SchedulerResult};

pub struct ExecutionPool {
    sender: mpsc::Sender<CollectionJob>,
    stop_tx: watch::Sender<bool>,
    closed: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
    capacity: usize,
}

impl ExecutionPool {
    /// 启动 `worker_count` 个工作协程，共享一个容量为 `queue_capacity` 的队列
    pub fn start(executor: Arc<dyn CollectionExecutor>, config: &ExecutorConfig) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let (stop_tx, stop_rx) = watch::channel(false);

        let workers = (0..config.worker_count.max(1))
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    executor.clone(),
                    receiver.clone(),
                    stop_rx.clone(),
                ))
            })
            .collect();

        info!(
            worker_count = config.worker_count,
            queue_capacity = capacity,
            "执行池已启动"
        );

        Self {
            sender,
            stop_tx,
            closed: AtomicBool::new(false),
            workers: Mutex::new(workers),
            capacity,
        }
    }

    /// 当前排队等待的作业数
    pub fn queued(&self) -> usize {
        self.capacity - self.sender.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 停止接收新作业，等待正在执行的作业结束，队列中剩余的作业被丢弃
    pub async fn shutdown(&self, timeout: Duration) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let dropped = self.queued();
        let _ = self.stop_tx.send(true);

        let workers: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        let join_all = futures::future::join_all(workers);
        match tokio::time::timeout(timeout, join_all).await {
            Ok(_) => info!(dropped, "执行池已停止"),
            Err(_) => warn!(dropped, timeout_seconds = timeout.as_secs(), "等待执行池停止超时"),
        }
    }
}

impl TaskDispatcher for ExecutionPool {
    fn submit(&self, job: CollectionJob) -> SchedulerResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SchedulerError::Internal("执行池已关闭".to_string()));
        }

        let task_id = job.task.id;
        match self.sender.try_send(job) {
            Ok(()) => {
                debug!(task_id, "采集作业已入队");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                counter!("execution_pool_rejections_total").increment(1);
                warn!(task_id, capacity = self.capacity, "执行池已满，拒绝采集作业");
                Err(SchedulerError::PoolSaturated { task_id })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(SchedulerError::Internal("执行池已关闭".to_string()))
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    executor: Arc<dyn CollectionExecutor>,
    receiver: Arc<Mutex<mpsc::Receiver<CollectionJob>>>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        if *stop_rx.borrow() {
            break;
        }

        let job = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                _ = stop_rx.changed() => None,
                job = receiver.recv() => job,
            }
        };

        let Some(job) = job else {
            break;
        };

        let task_id = job.task.id;
        let execution = executor.execute(&job.task, job.trigger);
        match AssertUnwindSafe(execution).catch_unwind().await {
            Ok(Ok(instance_id)) => debug!(worker_id, task_id, instance_id, "采集作业执行完成"),
            Ok(Err(SchedulerError::TaskDisabled { .. })) => {
                debug!(worker_id, task_id, "任务已禁用，作业已丢弃")
            }
            Ok(Err(e)) => error!(worker_id, task_id, error = %e, "采集作业执行失败"),
            Err(_) => error!(worker_id, task_id, "采集作业执行时发生panic"),
        }
    }

    debug!(worker_id, "执行池工作协程退出");
}
