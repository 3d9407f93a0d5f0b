use async_trait::async_trait;
use collector_core::{
    models::{MetricData, TaskInstance},
    traits::MetricSink,
    SchedulerError, SchedulerResult,
};
use metrics::counter;
use sqlx::SqlitePool;
use tracing::{debug, info};

/// 把指标值写入日志
#[derive(Debug, Default)]
pub struct LoggingMetricSink;

impl LoggingMetricSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetricSink for LoggingMetricSink {
    async fn send_metric_data(&self, data: &MetricData) -> SchedulerResult<()> {
        info!(
            task_id = data.task_id,
            instance_id = data.instance_id,
            asset_id = data.asset_id,
            metric_code = %data.metric_code,
            value = data.value,
            "采集指标"
        );
        counter!("collector_metric_points_total").increment(1);
        Ok(())
    }

    async fn send_collection_status(&self, instance: &TaskInstance) -> SchedulerResult<()> {
        info!(
            instance_id = instance.id,
            task_id = instance.task_id,
            status = %instance.status,
            data_points = instance.data_point_count,
            error = instance.error_message.as_deref().unwrap_or(""),
            "采集实例结束"
        );
        Ok(())
    }
}

/// 把指标值写入 `metric_data` 表
pub struct SqliteMetricSink {
    pool: SqlitePool,
}

impl SqliteMetricSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetricSink for SqliteMetricSink {
    async fn send_metric_data(&self, data: &MetricData) -> SchedulerResult<()> {
        self.send_metric_data_batch(std::slice::from_ref(data)).await
    }

    async fn send_metric_data_batch(&self, batch: &[MetricData]) -> SchedulerResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(SchedulerError::Database)?;
        for data in batch {
            sqlx::query(
                r#"
                INSERT INTO metric_data (task_id, instance_id, asset_id, metric_id, metric_code,
                                         value, unit, labels, collected_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(data.task_id)
            .bind(data.instance_id)
            .bind(data.asset_id)
            .bind(data.metric_id)
            .bind(&data.metric_code)
            .bind(data.value)
            .bind(&data.unit)
            .bind(serde_json::to_string(&data.labels)?)
            .bind(data.timestamp)
            .execute(&mut *tx)
            .await
            .map_err(SchedulerError::Database)?;
        }
        tx.commit().await.map_err(SchedulerError::Database)?;

        counter!("collector_metric_points_total").increment(batch.len() as u64);
        debug!("写入指标数据成功: {} 条", batch.len());
        Ok(())
    }
}
