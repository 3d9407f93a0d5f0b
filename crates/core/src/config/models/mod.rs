pub mod api_observability;
pub mod app_config;
pub mod asset_service;
pub mod database;
pub mod scheduler_executor;

pub use api_observability::{ApiConfig, ObservabilityConfig};
pub use app_config::AppConfig;
pub use asset_service::{AssetServiceConfig, AssetServiceKind, StaticAssetConfig};
pub use database::DatabaseConfig;
pub use scheduler_executor::{ExecutorConfig, SchedulerConfig};
