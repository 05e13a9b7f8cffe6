pub mod http;
pub mod rate_limit;

use std::future::Future;

use serde::Serialize;

use crate::metrics::types::DateWindow;
use crate::scope::Scope;

pub use http::HttpSource;

/// Failure reported by a snapshot source, before it is tied to a scope.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct FetchError {
    pub status: Option<u16>,
    pub message: String,
}

impl FetchError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == Some(429)
    }
}

/// Anything that can hand back a raw metrics payload for a scope.
///
/// Payload shape is not trusted; it goes through the normalizer untouched.
pub trait SnapshotSource: Send + Sync {
    fn fetch_snapshot(
        &self,
        scope: &Scope,
        window: Option<&DateWindow>,
    ) -> impl Future<Output = Result<serde_json::Value, FetchError>> + Send;
}

/// One failed member of a multi-team fetch.
#[derive(Debug, Clone, Serialize)]
pub struct TeamFailure {
    pub team: String,
    pub message: String,
}

/// Summary of a concurrent multi-team fetch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub org: String,
    pub status: BatchStatus,
    pub teams_fetched: u32,
    pub teams_failed: u32,
    pub failures: Vec<TeamFailure>,
}

impl BatchReport {
    /// Build a report with the status derived from the outcome counts.
    pub fn from_outcomes(org: String, teams_fetched: u32, failures: Vec<TeamFailure>) -> Self {
        let teams_failed = failures.len() as u32;
        let status = if teams_failed == 0 {
            BatchStatus::Success
        } else if teams_fetched > 0 {
            BatchStatus::PartialFailure
        } else {
            BatchStatus::Failed
        };
        Self {
            org,
            status,
            teams_fetched,
            teams_failed,
            failures,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BatchStatus {
    Success,
    PartialFailure,
    Failed,
}
