use async_trait::async_trait;
use chrono::{DateTime, Utc};
use collector_core::{
    models::CollectorRule, traits::RuleRepository, SchedulerError, SchedulerResult,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use super::parse_json_column;

const RULE_COLUMNS: &str = "id, name, rule_type, expression, enabled, description, task_ids, \
     timeout_seconds, retry_count, retry_interval_seconds, last_execute_time, next_execute_time, \
     created_at, updated_at";

pub struct SqliteRuleRepository {
    pool: SqlitePool,
}

impl SqliteRuleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_rule(row: &sqlx::sqlite::SqliteRow) -> SchedulerResult<CollectorRule> {
        let task_ids: String = row.try_get("task_ids")?;
        Ok(CollectorRule {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            rule_type: row.try_get("rule_type")?,
            expression: row.try_get("expression")?,
            enabled: row.try_get("enabled")?,
            description: row.try_get("description")?,
            task_ids: parse_json_column(&task_ids, "task_ids")?,
            timeout_seconds: row.try_get("timeout_seconds")?,
            retry_count: row.try_get("retry_count")?,
            retry_interval_seconds: row.try_get("retry_interval_seconds")?,
            last_execute_time: row.try_get("last_execute_time")?,
            next_execute_time: row.try_get("next_execute_time")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn task_ids_json(rule: &CollectorRule) -> SchedulerResult<String> {
        Ok(serde_json::to_string(&rule.task_ids)?)
    }
}

#[async_trait]
impl RuleRepository for SqliteRuleRepository {
    #[instrument(skip(self, rule), fields(rule_name = %rule.name, rule_type = %rule.rule_type))]
    async fn create(&self, rule: &CollectorRule) -> SchedulerResult<CollectorRule> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO collector_rules (name, rule_type, expression, enabled, description, task_ids,
                                         timeout_seconds, retry_count, retry_interval_seconds,
                                         last_execute_time, next_execute_time, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(&rule.name)
        .bind(rule.rule_type)
        .bind(&rule.expression)
        .bind(rule.enabled)
        .bind(&rule.description)
        .bind(Self::task_ids_json(rule)?)
        .bind(rule.timeout_seconds)
        .bind(rule.retry_count)
        .bind(rule.retry_interval_seconds)
        .bind(rule.last_execute_time)
        .bind(rule.next_execute_time)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        let id = result.last_insert_rowid();
        debug!("创建采集规则成功: ID {}", id);
        self.get_by_id(id)
            .await?
            .ok_or(SchedulerError::RuleNotFound { id })
    }

    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<CollectorRule>> {
        let row = sqlx::query(&format!(
            "SELECT {RULE_COLUMNS} FROM collector_rules WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        row.as_ref().map(Self::row_to_rule).transpose()
    }

    async fn update(&self, rule: &CollectorRule) -> SchedulerResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE collector_rules
            SET name = $2, rule_type = $3, expression = $4, enabled = $5, description = $6,
                task_ids = $7, timeout_seconds = $8, retry_count = $9,
                retry_interval_seconds = $10, next_execute_time = $11, updated_at = $12
            WHERE id = $1
            "#,
        )
        .bind(rule.id)
        .bind(&rule.name)
        .bind(rule.rule_type)
        .bind(&rule.expression)
        .bind(rule.enabled)
        .bind(&rule.description)
        .bind(Self::task_ids_json(rule)?)
        .bind(rule.timeout_seconds)
        .bind(rule.retry_count)
        .bind(rule.retry_interval_seconds)
        .bind(rule.next_execute_time)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::RuleNotFound { id: rule.id });
        }

        debug!("更新采集规则成功: ID {}", rule.id);
        Ok(())
    }

    async fn delete(&self, id: i64) -> SchedulerResult<()> {
        let result = sqlx::query("DELETE FROM collector_rules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::RuleNotFound { id });
        }

        debug!("删除采集规则成功: ID {}", id);
        Ok(())
    }

    async fn list(&self) -> SchedulerResult<Vec<CollectorRule>> {
        let rows = sqlx::query(&format!(
            "SELECT {RULE_COLUMNS} FROM collector_rules ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        rows.iter().map(Self::row_to_rule).collect()
    }

    async fn find_enabled(&self) -> SchedulerResult<Vec<CollectorRule>> {
        let rows = sqlx::query(&format!(
            "SELECT {RULE_COLUMNS} FROM collector_rules WHERE enabled = 1 ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        rows.iter().map(Self::row_to_rule).collect()
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
            UPDATE collector_rules
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

    async fn set_enabled(
        &self,
        id: i64,
        enabled: bool,
        next_execute_time: Option<DateTime<Utc>>,
    ) -> SchedulerResult<()> {
        let result = sqlx::query(
            "UPDATE collector_rules SET enabled = $2, next_execute_time = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(enabled)
        .bind(next_execute_time)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::RuleNotFound { id });
        }
        Ok(())
    }
}
