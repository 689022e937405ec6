//! CMS collection API
//!
//! The remote entity store is reached only through the [`RemoteStore`] trait.
//! [`CmsClient`] speaks HTTP; [`ResilientStore`] wraps it with retries,
//! concurrency limiting and dry-run interception.

pub mod client;
pub mod error;
#[cfg(test)]
pub mod memory;
pub mod models;
pub mod query;
pub mod resilience;
pub mod store;

pub use client::CmsClient;
pub use error::TransportError;
pub use models::{MutationResult, RemoteEntity, RemoteId};
pub use query::ListQuery;
pub use resilience::{ResilienceConfig, ResilientStore, RetryConfig};
pub use store::RemoteStore;
