use async_trait::async_trait;
use chrono::{DateTime, Utc};
use collector_core::{
    models::{ScheduleType, TaskSchedule},
    traits::ScheduleRepository,
    SchedulerError, SchedulerResult,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

const SCHEDULE_COLUMNS: &str = "id, name, task_id, schedule_type, fixed_rate_seconds, \
     cron_expression, execute_time, start_time, end_time, max_retries, retry_interval_seconds, \
     enabled, last_execute_time, next_execute_time, created_at, updated_at";

pub struct SqliteScheduleRepository {
    pool: SqlitePool,
}

impl SqliteScheduleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_schedule(row: &sqlx::sqlite::SqliteRow) -> SchedulerResult<TaskSchedule> {
        Ok(TaskSchedule {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            task_id: row.try_get("task_id")?,
            schedule_type: row.try_get("schedule_type")?,
            fixed_rate_seconds: row.try_get("fixed_rate_seconds")?,
            cron_expression: row.try_get("cron_expression")?,
            execute_time: row.try_get("execute_time")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            max_retries: row.try_get("max_retries")?,
            retry_interval_seconds: row.try_get("retry_interval_seconds")?,
            enabled: row.try_get("enabled")?,
            last_execute_time: row.try_get("last_execute_time")?,
            next_execute_time: row.try_get("next_execute_time")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn enabled_of_type(&self, schedule_type: ScheduleType) -> SchedulerResult<Vec<TaskSchedule>> {
        let rows = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM task_schedules \
             WHERE schedule_type = $1 AND enabled = 1 ORDER BY id"
        ))
        .bind(schedule_type)
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        rows.iter().map(Self::row_to_schedule).collect()
    }
}

#[async_trait]
impl ScheduleRepository for SqliteScheduleRepository {
    #[instrument(skip(self, schedule), fields(task_id = schedule.task_id, schedule_type = ?schedule.schedule_type))]
    async fn create(&self, schedule: &TaskSchedule) -> SchedulerResult<TaskSchedule> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO task_schedules (name, task_id, schedule_type, fixed_rate_seconds, cron_expression,
                                        execute_time, start_time, end_time, max_retries,
                                        retry_interval_seconds, enabled, last_execute_time,
                                        next_execute_time, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(&schedule.name)
        .bind(schedule.task_id)
        .bind(schedule.schedule_type)
        .bind(schedule.fixed_rate_seconds)
        .bind(&schedule.cron_expression)
        .bind(schedule.execute_time)
        .bind(schedule.start_time)
        .bind(schedule.end_time)
        .bind(schedule.max_retries)
        .bind(schedule.retry_interval_seconds)
        .bind(schedule.enabled)
        .bind(schedule.last_execute_time)
        .bind(schedule.next_execute_time)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        let id = result.last_insert_rowid();
        debug!("创建任务调度成功: ID {}", id);
        self.get_by_id(id)
            .await?
            .ok_or(SchedulerError::ScheduleNotFound { id })
    }

    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<TaskSchedule>> {
        let row = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM task_schedules WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        row.as_ref().map(Self::row_to_schedule).transpose()
    }

    async fn update(&self, schedule: &TaskSchedule) -> SchedulerResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE task_schedules
            SET name = $2, task_id = $3, schedule_type = $4, fixed_rate_seconds = $5,
                cron_expression = $6, execute_time = $7, start_time = $8, end_time = $9,
                max_retries = $10, retry_interval_seconds = $11, enabled = $12,
                next_execute_time = $13, updated_at = $14
            WHERE id = $1
            "#,
        )
        .bind(schedule.id)
        .bind(&schedule.name)
        .bind(schedule.task_id)
        .bind(schedule.schedule_type)
        .bind(schedule.fixed_rate_seconds)
        .bind(&schedule.cron_expression)
        .bind(schedule.execute_time)
        .bind(schedule.start_time)
        .bind(schedule.end_time)
        .bind(schedule.max_retries)
        .bind(schedule.retry_interval_seconds)
        .bind(schedule.enabled)
        .bind(schedule.next_execute_time)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::ScheduleNotFound { id: schedule.id });
        }

        debug!("更新任务调度成功: ID {}", schedule.id);
        Ok(())
    }

    async fn delete(&self, id: i64) -> SchedulerResult<()> {
        let result = sqlx::query("DELETE FROM task_schedules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::ScheduleNotFound { id });
        }

        debug!("删除任务调度成功: ID {}", id);
        Ok(())
    }

    async fn list(&self) -> SchedulerResult<Vec<TaskSchedule>> {
        let rows = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM task_schedules ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        rows.iter().map(Self::row_to_schedule).collect()
    }

    async fn list_by_task(&self, task_id: i64) -> SchedulerResult<Vec<TaskSchedule>> {
        let rows = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM task_schedules WHERE task_id = $1 ORDER BY id"
        ))
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        rows.iter().map(Self::row_to_schedule).collect()
    }

    async fn find_due_fixed_rate(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<TaskSchedule>> {
        let schedules = self.enabled_of_type(ScheduleType::FixedRate).await?;
        Ok(schedules
            .into_iter()
            .filter(|s| s.is_fixed_rate_due(now))
            .collect())
    }

    async fn find_due_one_shot(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<TaskSchedule>> {
        let schedules = self.enabled_of_type(ScheduleType::OneShot).await?;
        Ok(schedules
            .into_iter()
            .filter(|s| s.is_one_shot_due(now))
            .collect())
    }

    async fn find_cron_in_window(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<TaskSchedule>> {
        let schedules = self.enabled_of_type(ScheduleType::Cron).await?;
        Ok(schedules
            .into_iter()
            .filter(|s| s.is_within_window(now))
            .collect())
    }

    #[instrument(skip(self))]
    async fn claim_fire(
        &self,
        id: i64,
        expected_last: Option<DateTime<Utc>>,
        fired_at: DateTime<Utc>,
        next_execute_time: Option<DateTime<Utc>>,
    ) -> SchedulerResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE task_schedules
            SET last_execute_time = $2, next_execute_time = $3, updated_at = $2
            WHERE id = $1 AND enabled = 1 AND last_execute_time IS $4
            "#,
        )
        .bind(id)
        .bind(fired_at)
        .bind(next_execute_time)
        .bind(expected_last)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn claim_one_shot(&self, id: i64, fired_at: DateTime<Utc>) -> SchedulerResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE task_schedules
            SET last_execute_time = $2, next_execute_time = NULL, enabled = 0, updated_at = $2
            WHERE id = $1 AND enabled = 1 AND last_execute_time IS NULL
            "#,
        )
        .bind(id)
        .bind(fired_at)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_enabled(
        &self,
        id: i64,
        enabled: bool,
        next_execute_time: Option<DateTime<Utc>>,
    ) -> SchedulerResult<()> {
        let result = sqlx::query(
            "UPDATE task_schedules SET enabled = $2, next_execute_time = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(enabled)
        .bind(next_execute_time)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::ScheduleNotFound { id });
        }
        Ok(())
    }

    async fn touch_last_execute_time(&self, id: i64, at: DateTime<Utc>) -> SchedulerResult<()> {
        let result = sqlx::query(
            "UPDATE task_schedules SET last_execute_time = $2, updated_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::ScheduleNotFound { id });
        }
        Ok(())
    }
}
