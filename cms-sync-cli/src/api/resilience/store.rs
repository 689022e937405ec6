//! Resilient transport decorator
//!
//! Wraps any [`RemoteStore`] so that every call is bounded by the concurrency
//! limiter and retried by the shared [`RetryPolicy`]. In dry-run mode every
//! mutating call is answered locally and never reaches the wrapped store.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::concurrency::ConcurrencyLimiter;
use super::config::ResilienceConfig;
use super::retry::RetryPolicy;
use crate::api::error::TransportError;
use crate::api::models::{MutationResult, Page, RemoteId};
use crate::api::query::ListQuery;
use crate::api::store::RemoteStore;

pub struct ResilientStore<S> {
    inner: S,
    retry: RetryPolicy,
    limiter: ConcurrencyLimiter,
    dry_run: bool,
    attempts: Arc<AtomicU64>,
    intercepted: Arc<AtomicU64>,
}

/// Counters describing what the transport did during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportStats {
    /// HTTP attempts issued, retries included
    pub attempts: u64,
    /// Mutations answered locally because of dry run
    pub intercepted: u64,
    pub peak_in_flight: usize,
    /// Calls that queued behind the concurrency bound
    pub waited: u64,
}

impl<S: RemoteStore> ResilientStore<S> {
    pub fn new(inner: S, config: &ResilienceConfig, dry_run: bool) -> Self {
        Self {
            inner,
            retry: RetryPolicy::new(config.retry.clone()),
            limiter: ConcurrencyLimiter::new(config.concurrency.clone()),
            dry_run,
            attempts: Arc::new(AtomicU64::new(0)),
            intercepted: Arc::new(AtomicU64::new(0)),
        }
    }

    #[cfg(test)]
    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn stats(&self) -> TransportStats {
        let limiter = self.limiter.stats();
        TransportStats {
            attempts: self.attempts.load(Ordering::Relaxed),
            intercepted: self.intercepted.load(Ordering::Relaxed),
            peak_in_flight: limiter.peak_in_use,
            waited: limiter.requests_waited,
        }
    }

    fn simulate(&self, method: &str, path: String, fields: &Value) -> MutationResult {
        self.intercepted.fetch_add(1, Ordering::Relaxed);
        log::info!("[dry-run] would call {} {}", method, path);
        MutationResult::Simulated {
            method: method.to_string(),
            path,
            body: json!({ "data": fields }),
        }
    }
}

#[async_trait]
impl<S: RemoteStore> RemoteStore for ResilientStore<S> {
    async fn list(&self, collection: &str, query: &ListQuery) -> Result<Page, TransportError> {
        let operation = format!("GET /{} (page {})", collection, query.current_page());
        let (inner, limiter, attempts) = (&self.inner, &self.limiter, &self.attempts);
        self.retry
            .execute(&operation, move |_| async move {
                let _permit = limiter.acquire().await;
                attempts.fetch_add(1, Ordering::Relaxed);
                inner.list(collection, query).await
            })
            .await
    }

    async fn create(
        &self,
        collection: &str,
        fields: &Value,
    ) -> Result<MutationResult, TransportError> {
        if self.dry_run {
            return Ok(self.simulate("POST", format!("/{}", collection), fields));
        }

        let operation = format!("POST /{}", collection);
        let (inner, limiter, attempts) = (&self.inner, &self.limiter, &self.attempts);
        self.retry
            .execute(&operation, move |_| async move {
                let _permit = limiter.acquire().await;
                attempts.fetch_add(1, Ordering::Relaxed);
                inner.create(collection, fields).await
            })
            .await
    }

    async fn update(
        &self,
        collection: &str,
        id: &RemoteId,
        fields: &Value,
    ) -> Result<MutationResult, TransportError> {
        if self.dry_run {
            return Ok(self.simulate("PUT", format!("/{}/{}", collection, id), fields));
        }

        let operation = format!("PUT /{}/{}", collection, id);
        let (inner, limiter, attempts) = (&self.inner, &self.limiter, &self.attempts);
        self.retry
            .execute(&operation, move |_| async move {
                let _permit = limiter.acquire().await;
                attempts.fetch_add(1, Ordering::Relaxed);
                inner.update(collection, id, fields).await
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::memory::MemoryStore;
    use crate::api::resilience::RetryConfig;
    use std::time::Duration;

    fn config(max_attempts: u32) -> ResilienceConfig {
        ResilienceConfig::builder()
            .retry_config(RetryConfig {
                max_attempts,
                base_delay: Duration::from_millis(1),
                max_jitter: Duration::ZERO,
            })
            .max_concurrent_requests(4)
            .build()
    }

    fn unavailable() -> TransportError {
        TransportError::Status {
            status: 503,
            message: "Service Unavailable".to_string(),
        }
    }

    #[tokio::test]
    async fn test_transient_failures_then_success() {
        let memory = MemoryStore::new();
        memory.fail_next("POST", vec![unavailable(), unavailable()]);
        let store = ResilientStore::new(memory, &config(3), false);

        let result = store.create("products", &json!({"sku": "A"})).await;

        assert!(matches!(result, Ok(MutationResult::Applied(_))));
        assert_eq!(store.stats().attempts, 3);
        assert_eq!(store.inner().count("products"), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_last_error() {
        let memory = MemoryStore::new();
        memory.fail_next("POST", vec![unavailable(), unavailable(), unavailable()]);
        let store = ResilientStore::new(memory, &config(3), false);

        let result = store.create("products", &json!({"sku": "A"})).await;

        assert_eq!(result, Err(unavailable()));
        assert_eq!(store.stats().attempts, 3);
        assert_eq!(store.inner().count("products"), 0);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let memory = MemoryStore::new();
        memory.fail_next(
            "PUT",
            vec![TransportError::Status {
                status: 400,
                message: "invalid".to_string(),
            }],
        );
        let store = ResilientStore::new(memory, &config(5), false);

        let result = store
            .update("products", &RemoteId::from(1), &json!({"sku": "A"}))
            .await;

        assert_eq!(result.unwrap_err().status(), Some(400));
        assert_eq!(store.stats().attempts, 1);
    }

    #[tokio::test]
    async fn test_dry_run_never_reaches_inner_store() {
        let store = ResilientStore::new(MemoryStore::new(), &config(3), true);

        let created = store.create("products", &json!({"sku": "A"})).await.unwrap();
        let updated = store
            .update("products", &RemoteId::from(3), &json!({"sku": "B"}))
            .await
            .unwrap();

        assert!(matches!(created, MutationResult::Simulated { ref method, .. } if method == "POST"));
        match updated {
            MutationResult::Simulated { path, body, .. } => {
                assert_eq!(path, "/products/3");
                assert_eq!(body, json!({"data": {"sku": "B"}}));
            }
            other => panic!("expected simulated update, got {:?}", other),
        }
        assert_eq!(store.inner().mutation_calls(), 0);
        assert_eq!(store.stats().intercepted, 2);
        assert_eq!(store.stats().attempts, 0);
    }

    #[tokio::test]
    async fn test_dry_run_still_reads() {
        let memory = MemoryStore::new();
        memory.seed("regions", vec![json!({"name": "North"})]);
        let store = ResilientStore::new(memory, &config(3), true);

        let page = store.list("regions", &ListQuery::new()).await.unwrap();

        assert_eq!(page.items.len(), 1);
        assert_eq!(store.inner().calls_for("GET"), 1);
    }
}
