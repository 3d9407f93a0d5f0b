pub mod collectors;
pub mod coordinator;
pub mod execution_pool;

pub use collectors::HttpJsonCollector;
pub use coordinator::ExecutionCoordinator;
pub use execution_pool::ExecutionPool;
