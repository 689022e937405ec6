//! Concurrency limiter implementation
//!
//! Semaphore-based limiter bounding the number of HTTP requests in flight
//! against the CMS at any moment.

use super::config::ConcurrencyConfig;
use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

fn capacity(config: &ConcurrencyConfig) -> usize {
    if config.enabled {
        config.max_concurrent_requests.max(1)
    } else {
        // Tokio caps permits at 2^61-1; a large finite pool behaves as unlimited
        1_000_000
    }
}

/// Semaphore-based concurrency limiter for outbound requests
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    config: ConcurrencyConfig,
    requests_waited: Arc<AtomicU64>,
    peak_in_use: Arc<AtomicUsize>,
}

impl ConcurrencyLimiter {
    pub fn new(config: ConcurrencyConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity(&config))),
            config,
            requests_waited: Arc::new(AtomicU64::new(0)),
            peak_in_use: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn capacity(&self) -> usize {
        capacity(&self.config)
    }

    fn note_in_use(&self) {
        let in_use = self.capacity() - self.semaphore.available_permits();
        self.peak_in_use.fetch_max(in_use, Ordering::Relaxed);
    }

    /// Acquire a permit, waiting while at capacity.
    /// The permit is released when dropped.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        if self.semaphore.available_permits() == 0 {
            self.requests_waited.fetch_add(1, Ordering::Relaxed);
            debug!(
                "Concurrency limiter: waiting for permit ({} in use)",
                self.capacity()
            );
        }

        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("concurrency semaphore is never closed");
        self.note_in_use();
        permit
    }

    /// Try to acquire a permit without waiting
    #[cfg(test)]
    pub fn try_acquire(&self) -> Option<OwnedSemaphorePermit> {
        let permit = self.semaphore.clone().try_acquire_owned().ok()?;
        self.note_in_use();
        Some(permit)
    }

    #[cfg(test)]
    pub fn available_permits(&self) -> usize {
        if !self.config.enabled {
            return usize::MAX;
        }
        self.semaphore.available_permits()
    }

    pub fn stats(&self) -> ConcurrencyStats {
        ConcurrencyStats {
            requests_waited: self.requests_waited.load(Ordering::Relaxed),
            peak_in_use: self.peak_in_use.load(Ordering::Relaxed),
        }
    }
}

/// Statistics for the concurrency limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyStats {
    /// Number of times a request had to wait for a permit
    pub requests_waited: u64,
    /// Highest number of permits held at the same time
    pub peak_in_use: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: usize, enabled: bool) -> ConcurrencyLimiter {
        ConcurrencyLimiter::new(ConcurrencyConfig {
            max_concurrent_requests: max,
            enabled,
        })
    }

    #[tokio::test]
    async fn test_disabled_limiter_is_unbounded() {
        let limiter = limiter(5, false);

        let mut permits = Vec::new();
        for _ in 0..100 {
            permits.push(limiter.try_acquire().unwrap());
        }
        assert_eq!(permits.len(), 100);
        assert_eq!(limiter.available_permits(), usize::MAX);
    }

    #[tokio::test]
    async fn test_caps_at_max_permits() {
        let limiter = limiter(3, true);

        let p1 = limiter.try_acquire();
        let p2 = limiter.try_acquire();
        let p3 = limiter.try_acquire();
        let p4 = limiter.try_acquire();

        assert!(p1.is_some());
        assert!(p2.is_some());
        assert!(p3.is_some());
        assert!(p4.is_none());
        assert_eq!(limiter.available_permits(), 0);
    }

    #[tokio::test]
    async fn test_release_frees_a_slot() {
        let limiter = limiter(2, true);

        let p1 = limiter.try_acquire().unwrap();
        let _p2 = limiter.try_acquire().unwrap();
        assert!(limiter.try_acquire().is_none());

        drop(p1);
        assert!(limiter.try_acquire().is_some());
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let limiter = limiter(1, true);
        let waiter = limiter.clone();

        let permit = limiter.acquire().await;

        let handle = tokio::spawn(async move {
            let _permit = waiter.acquire().await;
            true
        });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        drop(permit);

        let result = tokio::time::timeout(std::time::Duration::from_millis(200), handle).await;
        assert!(result.is_ok());
        assert_eq!(limiter.stats().requests_waited, 1);
    }

    #[tokio::test]
    async fn test_stats_track_peak_usage() {
        let limiter = limiter(3, true);

        let _p1 = limiter.acquire().await;
        let _p2 = limiter.acquire().await;

        let stats = limiter.stats();
        assert_eq!(limiter.available_permits(), 1);
        assert_eq!(stats.peak_in_use, 2);
        assert_eq!(stats.requests_waited, 0);
    }
}
