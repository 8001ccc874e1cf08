//! Error and retry-policy types shared across the pipeline.
//!
//! Each port trait in [`crate::ports`] has its own error type here, so that
//! infrastructure crates can report failures without leaking transport types
//! into the domain. Every error that can cross a service boundary is able to
//! produce a [`RetryPolicy`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Returned by infrastructure error types to let the deployer decide whether
/// the queue should redeliver the job.
///
/// - `Retryable` errors: network failures, throttling, scratch storage
///   exhaustion.
/// - `NonRetryable` errors: missing configuration, malformed descriptors,
///   unsupported deploy types, unknown branches. These only change when the
///   repository content or the deployment configuration changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    ///
    /// `after` optionally specifies the minimum delay before retrying (e.g.
    /// derived from a `Retry-After` response header).
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// queue's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

impl RetryPolicy {
    /// Retryable with no particular delay.
    pub const fn retry() -> Self {
        Self::Retryable { after: None }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Required process-wide configuration is missing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An environment variable is unset or empty.
    #[error("Missing {0}")]
    Missing(&'static str),
}

// ---------------------------------------------------------------------------
// Port errors
// ---------------------------------------------------------------------------

/// Failures of [`crate::SourceRepository`] calls.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The requested file, repository, or ref does not exist (or is not visible
    /// to the configured credential).
    #[error("not found: {0}")]
    NotFound(String),

    /// The host answered but the response could not be interpreted.
    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    /// The request failed in transit or the host reported a server-side error.
    #[error("request failed: {message}")]
    Transport {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Writing the downloaded content to local scratch storage failed.
    #[error("local write failed: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::NotFound(_) | Self::InvalidResponse(_) => RetryPolicy::NonRetryable,
            Self::Transport { retry_after, .. } => RetryPolicy::Retryable {
                after: *retry_after,
            },
            Self::Io(_) => RetryPolicy::retry(),
        }
    }
}

/// Failures of [`crate::JobPublisher`] calls.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("job could not be serialised: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("publish to {topic} failed: {message}")]
    Request { topic: String, message: String },
}

/// Failures of [`crate::ObjectStore`] calls.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    /// The bucket does not exist or is not accessible.
    #[error("bucket {0} is not accessible")]
    BucketUnavailable(String),

    /// The store answered with an unusable response (e.g. a missing upload id).
    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    /// The request failed in transit or the service reported an error.
    #[error("request failed: {0}")]
    Request(String),
}

impl ObjectStoreError {
    pub fn retry_policy(&self) -> RetryPolicy {
        // Even a missing bucket may be a provisioning race; the queue's retry
        // limit bounds the cost.
        RetryPolicy::retry()
    }
}

/// Failures of [`crate::ErrorLog`] calls. Always swallowed by the reporter.
#[derive(Debug, Error)]
pub enum ErrorLogError {
    #[error("error record could not be written: {0}")]
    Write(String),
}
