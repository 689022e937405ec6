//! Resilience configuration with builder pattern
//!
//! Bundles the retry policy, the HTTP concurrency bound and the per-request
//! timeout into one value handed to the transport at construction.

use super::retry::RetryConfig;
use std::time::Duration;

/// Resilience configuration for remote store calls
#[derive(Debug, Clone, PartialEq)]
pub struct ResilienceConfig {
    pub retry: RetryConfig,
    pub concurrency: ConcurrencyConfig,
    /// Upper bound for a single HTTP attempt
    pub request_timeout: Duration,
}

/// Concurrency limiting configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrencyConfig {
    /// Maximum concurrent HTTP requests to the CMS
    pub max_concurrent_requests: usize,
    pub enabled: bool,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 8,
            enabled: true,
        }
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ResilienceConfig {
    pub fn builder() -> ResilienceConfigBuilder {
        ResilienceConfigBuilder::new()
    }
}

/// Builder for ResilienceConfig
#[derive(Debug)]
pub struct ResilienceConfigBuilder {
    config: ResilienceConfig,
}

impl ResilienceConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ResilienceConfig::default(),
        }
    }

    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn max_concurrent_requests(mut self, max: usize) -> Self {
        self.config.concurrency.max_concurrent_requests = max;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn build(self) -> ResilienceConfig {
        self.config
    }
}

impl Default for ResilienceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
