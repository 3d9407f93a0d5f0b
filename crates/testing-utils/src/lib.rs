//! # Collector Testing Utils
//!
//! Shared testing utilities for the collector scheduler workspace.
//!
//! ## Features
//!
//! - **Mock Repositories**: In-memory implementations of all repository traits
//! - **Mock Services**: Asset service, metric sink and dispatcher doubles
//! - **Test Collectors**: Collectors that succeed, fail, panic or stall
//! - **Test Data Builders**: Utilities for creating test data
//!
//! ## Usage
//!
//! ```toml
//! [dev-dependencies]
//! collector-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod collectors;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use collectors::*;
pub use helpers::*;
pub use mocks::*;
