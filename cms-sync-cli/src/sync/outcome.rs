//! Per-record outcomes

use serde_json::Value;
use std::fmt;

use crate::api::RemoteId;

/// Why a record was not sent
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SkipReason {
    MissingUniqueKey,
    InvalidNumeric { field: String },
    InvalidBoolean { field: String },
    /// The remote entity already holds the same values
    NoChanges,
    /// Abort-on-failure stopped the run before this record started
    Aborted,
    DeadlineExceeded,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingUniqueKey => write!(f, "missing unique key"),
            SkipReason::InvalidNumeric { field } => write!(f, "invalid numeric field '{}'", field),
            SkipReason::InvalidBoolean { field } => write!(f, "invalid boolean field '{}'", field),
            SkipReason::NoChanges => write!(f, "no changes"),
            SkipReason::Aborted => write!(f, "run aborted"),
            SkipReason::DeadlineExceeded => write!(f, "run deadline exceeded"),
        }
    }
}

/// Terminal result of one upsert task
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Created { id: RemoteId },
    Updated { id: RemoteId },
    Skipped(SkipReason),
    Failed { error: String },
    /// Dry run: the payload that would have been sent
    DrySimulated { payload: Value },
}

impl Outcome {
    pub fn failed(error: impl fmt::Display) -> Self {
        Outcome::Failed {
            error: error.to_string(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }
}
