use async_trait::async_trait;

use crate::{
    models::{MetricData, TaskInstance},
    SchedulerResult,
};

/// 下游指标接收端，对执行协调器而言是发送即忘
#[async_trait]
pub trait MetricSink: Send + Sync {
    async fn send_metric_data(&self, data: &MetricData) -> SchedulerResult<()>;

    async fn send_metric_data_batch(&self, batch: &[MetricData]) -> SchedulerResult<()> {
        for data in batch {
            self.send_metric_data(data).await?;
        }
        Ok(())
    }

    /// 采集实例结束后的状态通知
    async fn send_collection_status(&self, _instance: &TaskInstance) -> SchedulerResult<()> {
        Ok(())
    }
}
