use std::collections::HashMap;

use async_trait::async_trait;
use collector_core::{
    models::{MetricDefinition, MetricProtocolMapping},
    traits::MetricCatalogRepository,
    SchedulerError, SchedulerResult,
};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use super::parse_json_column;

pub struct SqliteMetricCatalogRepository {
    pool: SqlitePool,
}

impl SqliteMetricCatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_definition(row: &sqlx::sqlite::SqliteRow) -> SchedulerResult<MetricDefinition> {
        Ok(MetricDefinition {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            category: row.try_get("category")?,
            data_type: row.try_get("data_type")?,
            unit: row.try_get("unit")?,
            collection_method: row.try_get("collection_method")?,
            description: row.try_get("description")?,
            enabled: row.try_get("enabled")?,
        })
    }

    fn row_to_mapping(row: &sqlx::sqlite::SqliteRow) -> SchedulerResult<MetricProtocolMapping> {
        let parameters: String = row.try_get("parameters")?;
        Ok(MetricProtocolMapping {
            id: row.try_get("id")?,
            metric_id: row.try_get("metric_id")?,
            protocol: row.try_get("protocol")?,
            path: row.try_get("path")?,
            expression: row.try_get("expression")?,
            parameters: parse_json_column(&parameters, "parameters")?,
        })
    }

    /// 生成 `$start, $start+1, ...` 形式的占位符列表
    fn placeholders(start: usize, count: usize) -> String {
        (start..start + count)
            .map(|i| format!("${i}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[async_trait]
impl MetricCatalogRepository for SqliteMetricCatalogRepository {
    async fn upsert_definition(&self, definition: &MetricDefinition) -> SchedulerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO metric_definitions (id, code, name, category, data_type, unit,
                                            collection_method, description, enabled)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT(id) DO UPDATE SET
                code = excluded.code,
                name = excluded.name,
                category = excluded.category,
                data_type = excluded.data_type,
                unit = excluded.unit,
                collection_method = excluded.collection_method,
                description = excluded.description,
                enabled = excluded.enabled
            "#,
        )
        .bind(definition.id)
        .bind(&definition.code)
        .bind(&definition.name)
        .bind(&definition.category)
        .bind(&definition.data_type)
        .bind(&definition.unit)
        .bind(&definition.collection_method)
        .bind(&definition.description)
        .bind(definition.enabled)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        debug!("保存指标定义成功: ID {}", definition.id);
        Ok(())
    }

    async fn upsert_mapping(&self, mapping: &MetricProtocolMapping) -> SchedulerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO metric_protocol_mappings (metric_id, protocol, path, expression, parameters)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT(metric_id, protocol) DO UPDATE SET
                path = excluded.path,
                expression = excluded.expression,
                parameters = excluded.parameters
            "#,
        )
        .bind(mapping.metric_id)
        .bind(&mapping.protocol)
        .bind(&mapping.path)
        .bind(&mapping.expression)
        .bind(mapping.parameters.to_string())
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        debug!(
            "保存协议映射成功: 指标 {}, 协议 {}",
            mapping.metric_id, mapping.protocol
        );
        Ok(())
    }

    async fn get_definitions(&self, ids: &[i64]) -> SchedulerResult<Vec<MetricDefinition>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id, code, name, category, data_type, unit, collection_method, description, enabled \
             FROM metric_definitions WHERE enabled = 1 AND id IN ({})",
            Self::placeholders(1, ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        let mut by_id: HashMap<i64, MetricDefinition> = rows
            .iter()
            .map(Self::row_to_definition)
            .map(|r| r.map(|d| (d.id, d)))
            .collect::<SchedulerResult<_>>()?;

        // 按请求顺序返回，重复的ID只保留一次
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn get_mappings(
        &self,
        metric_ids: &[i64],
        protocol: &str,
    ) -> SchedulerResult<Vec<MetricProtocolMapping>> {
        if metric_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id, metric_id, protocol, path, expression, parameters \
             FROM metric_protocol_mappings WHERE lower(protocol) = lower($1) AND metric_id IN ({}) \
             ORDER BY metric_id",
            Self::placeholders(2, metric_ids.len())
        );
        let mut query = sqlx::query(&sql).bind(protocol);
        for id in metric_ids {
            query = query.bind(*id);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        rows.iter().map(Self::row_to_mapping).collect()
    }
}
