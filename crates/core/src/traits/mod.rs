pub mod asset;
pub mod collector;
pub mod execution;
pub mod repository;
pub mod sink;

pub use asset::*;
pub use collector::*;
pub use execution::*;
pub use repository::*;
pub use sink::*;
