//! service-core: Shared infrastructure for the accounting workspace.
pub mod config;
pub mod error;
pub mod observability;

pub use anyhow;
pub use tracing;
