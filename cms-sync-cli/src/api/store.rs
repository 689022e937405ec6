//! Remote entity store seam

use async_trait::async_trait;
use serde_json::Value;

use super::error::TransportError;
use super::models::{MutationResult, Page, RemoteId};
use super::query::ListQuery;

/// The three collection calls the sync pipeline needs
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// `GET /{collection}` with filters and paging
    async fn list(&self, collection: &str, query: &ListQuery) -> Result<Page, TransportError>;

    /// `POST /{collection}` with `{data: fields}`
    async fn create(&self, collection: &str, fields: &Value)
    -> Result<MutationResult, TransportError>;

    /// `PUT /{collection}/{id}` with `{data: fields}`
    async fn update(
        &self,
        collection: &str,
        id: &RemoteId,
        fields: &Value,
    ) -> Result<MutationResult, TransportError>;
}
