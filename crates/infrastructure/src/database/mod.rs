pub mod manager;
pub mod migrations;
pub mod sqlite;

pub use manager::DatabaseManager;
pub use sqlite::{
    SqliteInstanceRepository, SqliteMetricCatalogRepository, SqliteRuleRepository,
    SqliteScheduleRepository, SqliteTaskRepository,
};
