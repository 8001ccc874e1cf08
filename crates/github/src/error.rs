use std::time::Duration;

use pipeline::SourceError;
use thiserror::Error;

/// Failures talking to the GitHub API.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// The request never produced a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// GitHub answered with a non-success status.
    #[error("GitHub returned {status}: {message}")]
    Status {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    /// The response body was not what the endpoint documents.
    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GitHubError {
    /// Whether a later attempt could succeed without anything changing on
    /// GitHub's side.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::Io(_) => true,
            Self::Status { status, .. } => *status == 429 || *status == 403 || *status >= 500,
            Self::Decode(_) => false,
        }
    }
}

impl From<GitHubError> for SourceError {
    fn from(err: GitHubError) -> Self {
        match err {
            GitHubError::Status { status: 404, message, .. } => SourceError::NotFound(message),
            GitHubError::Status {
                status,
                message,
                retry_after,
            } if status == 429 || status == 403 || status >= 500 => SourceError::Transport {
                message: format!("{status}: {message}"),
                retry_after,
            },
            GitHubError::Status { status, message, .. } => {
                SourceError::InvalidResponse(format!("{status}: {message}"))
            }
            GitHubError::Http(e) => SourceError::Transport {
                message: e.to_string(),
                retry_after: None,
            },
            GitHubError::Decode(message) => SourceError::InvalidResponse(message),
            GitHubError::Io(e) => SourceError::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use pipeline::RetryPolicy;

    use super::*;

    fn status(status: u16) -> GitHubError {
        GitHubError::Status {
            status,
            message: "x".into(),
            retry_after: None,
        }
    }

    #[test]
    fn test_not_found_is_permanent() {
        let err: SourceError = status(404).into();
        assert!(matches!(err, SourceError::NotFound(_)));
        assert_eq!(err.retry_policy(), RetryPolicy::NonRetryable);
    }

    #[test]
    fn test_server_errors_and_rate_limits_are_transient() {
        for code in [403, 429, 500, 502, 503] {
            assert!(status(code).is_transient(), "{code}");
            let err: SourceError = status(code).into();
            assert!(err.retry_policy().is_retryable(), "{code}");
        }
    }

    #[test]
    fn test_other_client_errors_are_permanent() {
        let err: SourceError = status(422).into();
        assert!(matches!(err, SourceError::InvalidResponse(_)));
        assert!(!status(401).is_transient());
    }
}
