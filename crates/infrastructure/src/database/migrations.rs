use collector_core::SchedulerResult;
use sqlx::SqlitePool;
use tracing::debug;

const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS collector_tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        code TEXT NOT NULL UNIQUE,
        task_type TEXT NOT NULL,
        protocol TEXT NOT NULL,
        asset_id INTEGER NOT NULL,
        interval_seconds INTEGER NOT NULL DEFAULT 60,
        metrics TEXT NOT NULL DEFAULT '[]',
        connection_params TEXT NOT NULL DEFAULT '{}',
        status TEXT NOT NULL DEFAULT 'ENABLED',
        description TEXT,
        last_execute_time DATETIME,
        last_execute_status TEXT,
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS task_schedules (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        task_id INTEGER NOT NULL,
        schedule_type INTEGER NOT NULL,
        fixed_rate_seconds INTEGER,
        cron_expression TEXT,
        execute_time DATETIME,
        start_time DATETIME,
        end_time DATETIME,
        max_retries INTEGER NOT NULL DEFAULT 0,
        retry_interval_seconds INTEGER NOT NULL DEFAULT 60,
        enabled INTEGER NOT NULL DEFAULT 1,
        last_execute_time DATETIME,
        next_execute_time DATETIME,
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (task_id) REFERENCES collector_tasks(id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS collector_rules (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        rule_type TEXT NOT NULL,
        expression TEXT NOT NULL,
        enabled INTEGER NOT NULL DEFAULT 1,
        description TEXT,
        task_ids TEXT NOT NULL DEFAULT '[]',
        timeout_seconds INTEGER NOT NULL DEFAULT 60,
        retry_count INTEGER NOT NULL DEFAULT 0,
        retry_interval_seconds INTEGER NOT NULL DEFAULT 30,
        last_execute_time DATETIME,
        next_execute_time DATETIME,
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS task_instances (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id INTEGER NOT NULL,
        schedule_id INTEGER,
        rule_id INTEGER,
        trigger_source TEXT NOT NULL,
        asset_id INTEGER NOT NULL,
        start_time DATETIME NOT NULL,
        end_time DATETIME,
        status TEXT NOT NULL DEFAULT 'RUNNING',
        error_message TEXT,
        data_point_count INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS metric_definitions (
        id INTEGER PRIMARY KEY,
        code TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        category TEXT NOT NULL,
        data_type TEXT NOT NULL DEFAULT 'gauge',
        unit TEXT,
        collection_method TEXT NOT NULL,
        description TEXT,
        enabled INTEGER NOT NULL DEFAULT 1
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS metric_protocol_mappings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        metric_id INTEGER NOT NULL,
        protocol TEXT NOT NULL,
        path TEXT NOT NULL,
        expression TEXT,
        parameters TEXT NOT NULL DEFAULT '{}',
        UNIQUE (metric_id, protocol)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS metric_data (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id INTEGER NOT NULL,
        instance_id INTEGER NOT NULL,
        asset_id INTEGER NOT NULL,
        metric_id INTEGER NOT NULL,
        metric_code TEXT NOT NULL,
        value REAL NOT NULL,
        unit TEXT,
        labels TEXT NOT NULL DEFAULT '{}',
        collected_at DATETIME NOT NULL
    )
    "#,
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_collector_tasks_status ON collector_tasks(status)",
    "CREATE INDEX IF NOT EXISTS idx_task_schedules_type ON task_schedules(schedule_type, enabled)",
    "CREATE INDEX IF NOT EXISTS idx_task_schedules_task_id ON task_schedules(task_id)",
    "CREATE INDEX IF NOT EXISTS idx_collector_rules_enabled ON collector_rules(enabled)",
    "CREATE INDEX IF NOT EXISTS idx_task_instances_task_id ON task_instances(task_id)",
    "CREATE INDEX IF NOT EXISTS idx_metric_data_instance_id ON metric_data(instance_id)",
];

/// 运行数据库迁移
pub async fn run_migrations(pool: &SqlitePool) -> SchedulerResult<()> {
    debug!("Running SQLite database migrations");

    for statement in TABLES.iter().chain(INDEXES) {
        sqlx::query(statement).execute(pool).await?;
    }

    debug!("SQLite database migrations completed");
    Ok(())
}
