use async_trait::async_trait;
use chrono::{DateTime, Utc};
use collector_core::{
    models::{CollectorTask, InstanceStatus, TaskStatus},
    traits::TaskRepository,
    SchedulerError, SchedulerResult,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use super::{is_unique_violation, parse_json_column};

const TASK_COLUMNS: &str = "id, name, code, task_type, protocol, asset_id, interval_seconds, metrics, \
     connection_params, status, description, last_execute_time, last_execute_status, \
     created_at, updated_at";

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> SchedulerResult<CollectorTask> {
        let metrics: String = row.try_get("metrics")?;
        let connection_params: String = row.try_get("connection_params")?;
        Ok(CollectorTask {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            code: row.try_get("code")?,
            task_type: row.try_get("task_type")?,
            protocol: row.try_get("protocol")?,
            asset_id: row.try_get("asset_id")?,
            interval_seconds: row.try_get("interval_seconds")?,
            metrics: parse_json_column(&metrics, "metrics")?,
            connection_params: parse_json_column(&connection_params, "connection_params")?,
            status: row.try_get("status")?,
            description: row.try_get("description")?,
            last_execute_time: row.try_get("last_execute_time")?,
            last_execute_status: row.try_get("last_execute_status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn map_write_error(task: &CollectorTask, error: sqlx::Error) -> SchedulerError {
        if is_unique_violation(&error) {
            SchedulerError::DuplicateTaskCode {
                code: task.code.clone(),
            }
        } else {
            SchedulerError::Database(error)
        }
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    #[instrument(skip(self, task), fields(task_code = %task.code, protocol = %task.protocol))]
    async fn create(&self, task: &CollectorTask) -> SchedulerResult<CollectorTask> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO collector_tasks (name, code, task_type, protocol, asset_id, interval_seconds,
                                         metrics, connection_params, status, description,
                                         last_execute_time, last_execute_status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(&task.name)
        .bind(&task.code)
        .bind(&task.task_type)
        .bind(&task.protocol)
        .bind(task.asset_id)
        .bind(task.interval_seconds)
        .bind(task.metrics.to_string())
        .bind(task.connection_params.to_string())
        .bind(task.status)
        .bind(&task.description)
        .bind(task.last_execute_time)
        .bind(task.last_execute_status)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::map_write_error(task, e))?;

        let id = result.last_insert_rowid();
        debug!("创建采集任务成功: ID {}", id);
        self.get_by_id(id)
            .await?
            .ok_or(SchedulerError::TaskNotFound { id })
    }

    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<CollectorTask>> {
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM collector_tasks WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn get_by_code(&self, code: &str) -> SchedulerResult<Option<CollectorTask>> {
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM collector_tasks WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn update(&self, task: &CollectorTask) -> SchedulerResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE collector_tasks
            SET name = $2, code = $3, task_type = $4, protocol = $5, asset_id = $6,
                interval_seconds = $7, metrics = $8, connection_params = $9, status = $10,
                description = $11, updated_at = $12
            WHERE id = $1
            "#,
        )
        .bind(task.id)
        .bind(&task.name)
        .bind(&task.code)
        .bind(&task.task_type)
        .bind(&task.protocol)
        .bind(task.asset_id)
        .bind(task.interval_seconds)
        .bind(task.metrics.to_string())
        .bind(task.connection_params.to_string())
        .bind(task.status)
        .bind(&task.description)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| Self::map_write_error(task, e))?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::TaskNotFound { id: task.id });
        }

        debug!("更新采集任务成功: ID {}", task.id);
        Ok(())
    }

    async fn delete(&self, id: i64) -> SchedulerResult<()> {
        let result = sqlx::query("DELETE FROM collector_tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::TaskNotFound { id });
        }

        debug!("删除采集任务成功: ID {}", id);
        Ok(())
    }

    async fn list(&self) -> SchedulerResult<Vec<CollectorTask>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM collector_tasks ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        rows.iter().map(Self::row_to_task).collect()
    }

    async fn find_due_interval_tasks(
        &self,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Vec<CollectorTask>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM collector_tasks WHERE status = $1 ORDER BY id"
        ))
        .bind(TaskStatus::Enabled)
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        let tasks: SchedulerResult<Vec<CollectorTask>> =
            rows.iter().map(Self::row_to_task).collect();
        Ok(tasks?
            .into_iter()
            .filter(|task| task.is_interval_due(now))
            .collect())
    }

    #[instrument(skip(self))]
    async fn claim_interval(
        &self,
        id: i64,
        expected_last: Option<DateTime<Utc>>,
        fired_at: DateTime<Utc>,
    ) -> SchedulerResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE collector_tasks
            SET last_execute_time = $2
            WHERE id = $1 AND status = $3 AND last_execute_time IS $4
            "#,
        )
        .bind(id)
        .bind(fired_at)
        .bind(TaskStatus::Enabled)
        .bind(expected_last)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_last_execution(
        &self,
        id: i64,
        executed_at: DateTime<Utc>,
        status: InstanceStatus,
    ) -> SchedulerResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE collector_tasks
            SET last_execute_time = $2, last_execute_status = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(executed_at)
        .bind(status)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::TaskNotFound { id });
        }
        Ok(())
    }
}
