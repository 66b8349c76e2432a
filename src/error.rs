//! Typed errors for the discovery engine.
//!
//! One enum per failure family. Per-item problems never surface here; they
//! are counted and reported inside result objects instead.

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// A discoverer could not be brought up (missing credentials, bad config).
/// Fatal to that discoverer only.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("missing credential `{0}`")]
    MissingCredential(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("health check failed for `{0}`")]
    Unhealthy(String),

    #[error("discoverer `{0}` is already registered")]
    DuplicateName(String),
}

/// Failure during a discoverer run.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),

    #[error("discoverer `{0}` is not initialized")]
    NotInitialized(String),

    #[error("{0}")]
    Other(String),
}

impl DiscoveryError {
    /// Network-ish failures are worth another attempt; parse failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DiscoveryError::Http(_)
                | DiscoveryError::Status { .. }
                | DiscoveryError::Timeout(_)
                | DiscoveryError::RateLimited(_)
        )
    }
}

/// Hard daily quota of a source is used up.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("rate limit exceeded for `{source_name}`: daily quota of {quota} used")]
pub struct RateLimitExceeded {
    pub source_name: String,
    pub quota: u32,
}

/// Repository collaborator failures.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("opportunity {0} not found")]
    NotFound(Uuid),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Corpus scan failure. Partial counters travel with the error.
#[derive(Debug, Error)]
#[error("deduplication failed after {processed} records: {source}")]
pub struct DeduplicationError {
    pub processed: usize,
    #[source]
    pub source: RepositoryError,
}

/// Errors returned by the orchestrator API.
#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("unknown discoverer `{0}`")]
    UnknownDiscoverer(String),

    #[error("discoverer `{0}` is disabled or failed to initialize")]
    Unavailable(String),

    #[error("invalid schedule cadence `{0}`")]
    InvalidCadence(String),

    #[error("job {0} not found")]
    JobNotFound(Uuid),

    #[error("no sources requested")]
    EmptyJob,

    #[error(transparent)]
    Init(#[from] InitError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Deduplication(#[from] DeduplicationError),
}

pub type DiscoveryResult<T> = std::result::Result<T, DiscoveryError>;
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_follows_failure_kind() {
        assert!(DiscoveryError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(DiscoveryError::Status {
            status: 503,
            url: "https://x.org".into()
        }
        .is_retryable());
        assert!(!DiscoveryError::Parse("bad".into()).is_retryable());
    }

    #[test]
    fn rate_limit_message_names_source() {
        let e = RateLimitExceeded {
            source_name: "serp".into(),
            quota: 100,
        };
        assert!(e.to_string().contains("serp"));
    }
}
