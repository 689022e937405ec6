//! Transport error classification

use thiserror::Error;

use super::resilience::RetryableError;

/// Error from a single call against the CMS
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    /// Connection refused/reset, DNS failure and similar
    #[error("network error: {0}")]
    Network(String),
    /// The attempt exceeded the request timeout
    #[error("request timed out: {0}")]
    Timeout(String),
    /// Non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    /// The response body did not have the expected shape
    #[error("invalid response: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            TransportError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            TransportError::Network(err.to_string())
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 404 is left to the caller to interpret
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl RetryableError for TransportError {
    fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network(_) | TransportError::Timeout(_) => true,
            // 408 and 429 are the only 4xx codes where waiting helps
            TransportError::Status { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            TransportError::Decode(_) => false,
        }
    }
}
