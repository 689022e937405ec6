//! Resilience features for remote store calls
//!
//! Provides the retry policy, concurrency limiting and the store decorator
//! that applies both to every call issued against the CMS.

pub mod concurrency;
pub mod config;
pub mod retry;
pub mod store;

pub use config::ResilienceConfig;
pub use retry::{RetryConfig, RetryableError};
pub use store::ResilientStore;
