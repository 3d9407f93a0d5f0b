use async_trait::async_trait;
use collector_core::{
    models::{InstanceOutcome, TaskInstance},
    traits::InstanceRepository,
    SchedulerError, SchedulerResult,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

const INSTANCE_COLUMNS: &str = "id, task_id, schedule_id, rule_id, trigger_source, asset_id, \
     start_time, end_time, status, error_message, data_point_count";

pub struct SqliteInstanceRepository {
    pool: SqlitePool,
}

impl SqliteInstanceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_instance(row: &sqlx::sqlite::SqliteRow) -> SchedulerResult<TaskInstance> {
        Ok(TaskInstance {
            id: row.try_get("id")?,
            task_id: row.try_get("task_id")?,
            schedule_id: row.try_get("schedule_id")?,
            rule_id: row.try_get("rule_id")?,
            trigger_source: row.try_get("trigger_source")?,
            asset_id: row.try_get("asset_id")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            status: row.try_get("status")?,
            error_message: row.try_get("error_message")?,
            data_point_count: row.try_get("data_point_count")?,
        })
    }
}

#[async_trait]
impl InstanceRepository for SqliteInstanceRepository {
    #[instrument(skip(self, instance), fields(task_id = instance.task_id, trigger = %instance.trigger_source))]
    async fn create(&self, instance: &TaskInstance) -> SchedulerResult<TaskInstance> {
        let result = sqlx::query(
            r#"
            INSERT INTO task_instances (task_id, schedule_id, rule_id, trigger_source, asset_id,
                                        start_time, end_time, status, error_message, data_point_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(instance.task_id)
        .bind(instance.schedule_id)
        .bind(instance.rule_id)
        .bind(instance.trigger_source)
        .bind(instance.asset_id)
        .bind(instance.start_time)
        .bind(instance.end_time)
        .bind(instance.status)
        .bind(&instance.error_message)
        .bind(instance.data_point_count)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        let mut created = instance.clone();
        created.id = result.last_insert_rowid();
        debug!("创建采集实例成功: ID {}", created.id);
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<TaskInstance>> {
        let row = sqlx::query(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM task_instances WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        row.as_ref().map(Self::row_to_instance).transpose()
    }

    #[instrument(skip(self, outcome), fields(status = %outcome.status))]
    async fn finish(&self, id: i64, outcome: &InstanceOutcome) -> SchedulerResult<TaskInstance> {
        let result = sqlx::query(
            r#"
            UPDATE task_instances
            SET status = $2, end_time = $3, error_message = $4, data_point_count = $5
            WHERE id = $1 AND end_time IS NULL
            "#,
        )
        .bind(id)
        .bind(outcome.status)
        .bind(outcome.end_time)
        .bind(&outcome.error_message)
        .bind(outcome.data_point_count)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        if result.rows_affected() == 0 {
            return match self.get_by_id(id).await? {
                Some(_) => Err(SchedulerError::InstanceAlreadyFinished { id }),
                None => Err(SchedulerError::InstanceNotFound { id }),
            };
        }

        debug!("结束采集实例成功: ID {}, 状态 {}", id, outcome.status);
        self.get_by_id(id)
            .await?
            .ok_or(SchedulerError::InstanceNotFound { id })
    }

    async fn list_by_task(&self, task_id: i64, limit: i64) -> SchedulerResult<Vec<TaskInstance>> {
        let rows = sqlx::query(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM task_instances WHERE task_id = $1 \
             ORDER BY start_time DESC, id DESC LIMIT $2"
        ))
        .bind(task_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        rows.iter().map(Self::row_to_instance).collect()
    }
}
