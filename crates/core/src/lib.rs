pub mod collector_registry;
pub mod config;
pub mod errors;
pub mod metric_value;
pub mod models;
pub mod traits;

pub use collector_registry::*;
pub use errors::*;
pub use models::*;
pub use traits::*;
