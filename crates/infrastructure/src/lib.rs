pub mod asset_service;
pub mod database;
pub mod metric_sink;

pub use asset_service::*;
pub use database::*;
pub use metric_sink::*;
