//! Run configuration
//!
//! Everything the pipeline reads from the environment or the command line is
//! collected once into an immutable [`SyncConfig`] and handed to the
//! components that need it.

pub mod pipeline;

pub use pipeline::{PipelineDefinition, ReferenceDefinition, StageDefinition};

use reqwest::Url;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::api::{ResilienceConfig, RetryConfig};
use crate::cli::SyncArgs;
use crate::sync::{MappingError, PipelineOptions};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing API token: set CMS_SYNC_TOKEN or pass --token")]
    MissingCredential,
    #[error("missing base URL: set CMS_SYNC_URL or pass --url")]
    MissingBaseUrl,
    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("cannot read pipeline {}: {source}", .path.display())]
    PipelineRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse pipeline {}: {source}", .path.display())]
    PipelineParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid pipeline: {0}")]
    Pipeline(String),
    #[error("stage '{stage}': {source}")]
    Stage {
        stage: String,
        #[source]
        source: MappingError,
    },
    #[error("unknown stage '{0}'")]
    UnknownStage(String),
}

/// Immutable settings for one run
#[derive(Clone)]
pub struct SyncConfig {
    pub base_url: Url,
    token: String,
    pub resilience: ResilienceConfig,
    pub pipeline: PipelineOptions,
    /// Exit non-zero when any record failed
    pub fail_on_error: bool,
    pub journal: Option<PathBuf>,
}

impl SyncConfig {
    pub fn from_args(args: &SyncArgs) -> Result<Self, ConfigError> {
        let token = args
            .token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(ConfigError::MissingCredential)?
            .to_string();

        let raw_url = args
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::MissingBaseUrl)?;
        let base_url = parse_base_url(raw_url)?;

        if args.concurrency == 0 {
            return Err(ConfigError::Zero("--concurrency"));
        }
        if args.page_size == 0 {
            return Err(ConfigError::Zero("--page-size"));
        }
        if args.timeout_secs == 0 {
            return Err(ConfigError::Zero("--timeout-secs"));
        }
        if args.deadline_secs == Some(0) {
            return Err(ConfigError::Zero("--deadline-secs"));
        }

        let resilience = ResilienceConfig::builder()
            .retry_config(RetryConfig {
                max_attempts: args.retries.max(1),
                base_delay: Duration::from_millis(args.retry_base_ms),
                max_jitter: Duration::from_millis(args.retry_jitter_ms),
            })
            .max_concurrent_requests(args.concurrency)
            .request_timeout(Duration::from_secs(args.timeout_secs))
            .build();

        let pipeline = PipelineOptions {
            concurrency: args.concurrency,
            abort_on_failure: args.abort_on_failure,
            continue_on_error: args.continue_on_error,
            dry_run: args.dry_run,
            skip_unchanged: !args.always_update,
            page_size: args.page_size,
            failure_report_limit: args.error_limit,
            run_deadline: args.deadline_secs.map(Duration::from_secs),
        };

        Ok(Self {
            base_url,
            token,
            resilience,
            pipeline,
            fail_on_error: !args.no_fail_on_error,
            journal: args.journal.clone(),
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"<redacted>")
            .field("resilience", &self.resilience)
            .field("pipeline", &self.pipeline)
            .field("fail_on_error", &self.fail_on_error)
            .field("journal", &self.journal)
            .finish()
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ConfigError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", scheme),
        }),
    }
}
