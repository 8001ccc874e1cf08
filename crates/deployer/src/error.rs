use std::time::Duration;

use pipeline::{ConfigError, DeployKind, DescriptorError, GitRef, RetryPolicy, SourceError};
use thiserror::Error;

use crate::archive::ArchiveError;
use crate::sync::SyncError;

/// Everything that can stop a deploy job.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("job message is not a deploy job: {0}")]
    Job(#[source] serde_json::Error),

    #[error("job message is a {0} notification, not a deploy job")]
    NotAJob(String),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error("{0} deploys are not implemented")]
    UnsupportedKind(DeployKind),

    #[error("ref {0} is not a branch")]
    NotABranch(GitRef),

    #[error("snapshot download failed: {0}")]
    Download(#[from] SourceError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("scratch storage failed: {0}")]
    Scratch(#[source] std::io::Error),
}

impl DeployError {
    /// Name of the failing step, as written to the error log.
    pub fn step(&self) -> &'static str {
        match self {
            Self::Config(_) => "load_config",
            Self::Job(_) | Self::NotAJob(_) => "parse_job",
            Self::Descriptor(_) | Self::UnsupportedKind(_) | Self::NotABranch(_) => {
                "resolve_target"
            }
            Self::Download(_) => "download_archive",
            Self::Archive(_) => "extract_archive",
            Self::Sync(_) => "sync_bucket",
            Self::Scratch(_) => "prepare_scratch",
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Config(_)
            | Self::Job(_)
            | Self::NotAJob(_)
            | Self::Descriptor(_)
            | Self::UnsupportedKind(_)
            | Self::NotABranch(_) => RetryPolicy::NonRetryable,
            Self::Download(e) => e.retry_policy(),
            Self::Archive(e) => e.retry_policy(),
            Self::Sync(e) => e.retry_policy(),
            Self::Scratch(_) => RetryPolicy::retry(),
        }
    }
}

/// A failed job the queue should deliver again.
#[derive(Debug, Error)]
#[error("{step} failed: {error}")]
pub struct DeployFailure {
    pub step: &'static str,
    #[source]
    pub error: DeployError,
}

impl DeployFailure {
    /// Minimum delay before redelivery, when the failing call named one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self.error.retry_policy() {
            RetryPolicy::Retryable { after } => after,
            RetryPolicy::NonRetryable => None,
        }
    }
}

impl From<DeployError> for DeployFailure {
    fn from(error: DeployError) -> Self {
        Self {
            step: error.step(),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use pipeline::BranchName;

    use super::*;

    #[test]
    fn test_repository_problems_are_permanent() {
        let errors = [
            DeployError::from(ConfigError::Missing("GITHUB_PERSONAL_ACCESS_TOKEN")),
            DeployError::UnsupportedKind(DeployKind::ElasticBeanstalk),
            DeployError::from(DescriptorError::NoTarget {
                branch: BranchName::new("feature").unwrap(),
            }),
            DeployError::from(ArchiveError::SubdirNotFound { root: "abc//app".into() }),
            DeployError::from(SourceError::NotFound("octo/site@refs/heads/gone".into())),
        ];
        for error in errors {
            assert_eq!(error.retry_policy(), RetryPolicy::NonRetryable, "{error}");
        }
    }

    #[test]
    fn test_transport_failure_keeps_retry_after() {
        let failure = DeployFailure::from(DeployError::from(SourceError::Transport {
            message: "503".into(),
            retry_after: Some(Duration::from_secs(30)),
        }));
        assert_eq!(failure.step, "download_archive");
        assert_eq!(failure.retry_after(), Some(Duration::from_secs(30)));
        assert_eq!(failure.to_string(), "download_archive failed: snapshot download failed: request failed: 503");
    }

    #[test]
    fn test_steps() {
        assert_eq!(DeployError::UnsupportedKind(DeployKind::ElasticBeanstalk).step(), "resolve_target");
        assert_eq!(
            DeployError::Scratch(std::io::Error::other("disk full")).step(),
            "prepare_scratch"
        );
    }
}
