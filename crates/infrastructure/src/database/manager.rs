use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use collector_core::{
    config::DatabaseConfig,
    traits::{
        InstanceRepository, MetricCatalogRepository, RuleRepository, ScheduleRepository,
        TaskRepository,
    },
    SchedulerResult,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::{
    migrations::run_migrations,
    sqlite::{
        SqliteInstanceRepository, SqliteMetricCatalogRepository, SqliteRuleRepository,
        SqliteScheduleRepository, SqliteTaskRepository,
    },
};

/// SQLite 实体存储管理器
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// 按配置连接数据库，文件不存在时自动创建并执行迁移
    pub async fn new(config: &DatabaseConfig) -> SchedulerResult<Self> {
        debug!("Connecting SQLite entity store at: {}", config.url);

        let connect_options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .connect_with(connect_options)
            .await?;

        run_migrations(&pool).await?;
        info!("实体存储已就绪: {}", config.url);
        Ok(Self { pool })
    }

    /// 内存数据库，只使用一个连接以保证所有查询看到同一个库
    pub async fn new_in_memory() -> SchedulerResult<Self> {
        let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_options)
            .await?;

        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn health_check(&self) -> SchedulerResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn task_repository(&self) -> Arc<dyn TaskRepository> {
        Arc::new(SqliteTaskRepository::new(self.pool.clone()))
    }

    pub fn schedule_repository(&self) -> Arc<dyn ScheduleRepository> {
        Arc::new(SqliteScheduleRepository::new(self.pool.clone()))
    }

    pub fn rule_repository(&self) -> Arc<dyn RuleRepository> {
        Arc::new(SqliteRuleRepository::new(self.pool.clone()))
    }

    pub fn instance_repository(&self) -> Arc<dyn InstanceRepository> {
        Arc::new(SqliteInstanceRepository::new(self.pool.clone()))
    }

    pub fn metric_catalog_repository(&self) -> Arc<dyn MetricCatalogRepository> {
        Arc::new(SqliteMetricCatalogRepository::new(self.pool.clone()))
    }
}
