//! Live stats data layer.
//!
//! Defines the `SnapshotProvider` trait, the failure taxonomy for
//! upstream calls, and the breaker-protected, cached `SnapshotFetcher`
//! the engine reads snapshots through.

pub mod breaker;
pub mod espn;
pub mod fetcher;

use async_trait::async_trait;
use std::time::Duration;

use crate::types::{FailureKind, LiveSnapshot};

/// Why a snapshot could not be produced.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("upstream call timed out after {0:?}")]
    Timeout(Duration),

    #[error("circuit breaker open for {provider}")]
    BreakerOpen { provider: String },

    #[error("upstream returned HTTP {0}")]
    UpstreamStatus(u16),

    #[error("upstream rejected request with HTTP {0}")]
    Rejected(u16),

    #[error("malformed upstream response: {0}")]
    Malformed(String),

    #[error("league '{0}' is not supported by this provider")]
    UnsupportedLeague(String),
}

impl FetchError {
    /// Transient failures are retried and count against the breaker.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Network(_)
                | FetchError::Timeout(_)
                | FetchError::BreakerOpen { .. }
                | FetchError::UpstreamStatus(_)
        )
    }

    pub fn kind(&self) -> FailureKind {
        if self.is_transient() {
            FailureKind::Transient
        } else {
            FailureKind::Permanent
        }
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network",
            FetchError::Timeout(_) => "timeout",
            FetchError::BreakerOpen { .. } => "breaker_open",
            FetchError::UpstreamStatus(_) => "upstream_status",
            FetchError::Rejected(_) => "rejected",
            FetchError::Malformed(_) => "malformed",
            FetchError::UnsupportedLeague(_) => "unsupported_league",
        }
    }
}

/// Abstraction over live sports-data sources.
///
/// Implementors fetch one game's current box score and refine it into
/// a `LiveSnapshot`. The upstream API is replaceable behind this trait.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Fetch the latest snapshot for a game.
    async fn fetch_snapshot(&self, league: &str, game_id: &str) -> Result<LiveSnapshot, FetchError>;

    /// Provider name for logging, metrics and breaker identity.
    fn name(&self) -> &'static str;
}
