//! The per-job deploy sequence.

use std::path::PathBuf;
use std::sync::Arc;

use pipeline::{
    BucketName, ConfigError, Credentials, DeployJob, DeployKind, ErrorReporter, InvocationContext,
    ObjectStore, SourceRepository,
};
use tracing::{info, instrument, warn};

use crate::archive::{self, ArchiveError};
use crate::job::parse_job;
use crate::sync::{self, SyncOptions, SyncReport};
use crate::{DeployError, DeployFailure};

const ARCHIVE_FILE: &str = "snapshot.zip";
const TREE_DIR: &str = "tree";

/// How a job ended, when the queue must not redeliver it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployResolution {
    Deployed {
        bucket: BucketName,
        uploaded: usize,
        deleted: usize,
        unchanged: usize,
    },
    /// The job cannot succeed until the repository or configuration changes.
    Rejected { reason: String },
}

impl std::fmt::Display for DeployResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deployed {
                bucket,
                uploaded,
                deleted,
                unchanged,
            } => write!(
                f,
                "Deployed to {bucket}: {uploaded} uploaded, {deleted} deleted, {unchanged} unchanged"
            ),
            Self::Rejected { reason } => write!(f, "Rejected: {reason}"),
        }
    }
}

/// Downloads, extracts, and mirrors one job at a time.
pub struct Deployer {
    credentials: Result<Credentials, ConfigError>,
    source: Arc<dyn SourceRepository>,
    store: Arc<dyn ObjectStore>,
    reporter: ErrorReporter,
    scratch_root: PathBuf,
    sync_options: SyncOptions,
}

impl Deployer {
    pub fn new(
        credentials: Result<Credentials, ConfigError>,
        source: Arc<dyn SourceRepository>,
        store: Arc<dyn ObjectStore>,
        reporter: ErrorReporter,
    ) -> Self {
        Self {
            credentials,
            source,
            store,
            reporter,
            scratch_root: std::env::temp_dir(),
            sync_options: SyncOptions::default(),
        }
    }

    /// Directory under which each invocation creates its scratch directory.
    pub fn with_scratch_root(mut self, scratch_root: impl Into<PathBuf>) -> Self {
        self.scratch_root = scratch_root.into();
        self
    }

    pub fn with_sync_options(mut self, sync_options: SyncOptions) -> Self {
        self.sync_options = sync_options;
        self
    }

    /// Handles one queued message.
    ///
    /// Every failure is reported once. Failures that a retry cannot fix
    /// resolve as [`DeployResolution::Rejected`]; the rest are returned as
    /// [`DeployFailure`] so the queue redelivers the job.
    #[instrument(skip_all, fields(invocation_id = %ctx.invocation_id))]
    pub async fn handle_message(
        &self,
        message: &str,
        ctx: &InvocationContext,
    ) -> Result<DeployResolution, DeployFailure> {
        match self.process(message, ctx).await {
            Ok(resolution) => Ok(resolution),
            Err(err) => {
                self.reporter.report(err.step(), &err).await;
                if err.retry_policy().is_retryable() {
                    warn!(step = err.step(), error = %err, "Deploy failed, requesting retry");
                    Err(err.into())
                } else {
                    info!(step = err.step(), error = %err, "Deploy rejected");
                    Ok(DeployResolution::Rejected {
                        reason: err.to_string(),
                    })
                }
            }
        }
    }

    async fn process(
        &self,
        message: &str,
        ctx: &InvocationContext,
    ) -> Result<DeployResolution, DeployError> {
        self.credentials.as_ref().map_err(Clone::clone)?;
        let job = parse_job(message)?;
        let bucket = resolve_bucket(&job)?;
        info!(repo = %job.repository(), git_ref = %job.git_ref, %bucket, "Deploying");

        tokio::fs::create_dir_all(&self.scratch_root)
            .await
            .map_err(DeployError::Scratch)?;
        let scratch = tempfile::Builder::new()
            .prefix(&format!("deploy-{}-", ctx.invocation_id))
            .tempdir_in(&self.scratch_root)
            .map_err(DeployError::Scratch)?;
        let archive_path = scratch.path().join(ARCHIVE_FILE);
        let tree = scratch.path().join(TREE_DIR);

        let bytes = self
            .source
            .download_archive(&job.repository(), &job.git_ref, &archive_path)
            .await?;
        info!(bytes, "Snapshot downloaded");

        let subdir = job.deploy.subdir.clone();
        let extract_to = tree.clone();
        let files = tokio::task::spawn_blocking(move || -> Result<usize, ArchiveError> {
            let entries = archive::read_entries(&archive_path)?;
            let root = archive::resolve_root(&entries, subdir.as_deref())?;
            archive::extract_subtree(&archive_path, &root, &extract_to)
        })
        .await
        .map_err(|e| DeployError::Scratch(std::io::Error::other(e)))??;
        info!(files, "Snapshot extracted");

        let report: SyncReport = sync::mirror(
            self.store.as_ref(),
            &bucket,
            &tree,
            &self.sync_options,
            &sync::log_progress,
        )
        .await?;
        info!(
            %bucket,
            uploaded = report.uploaded,
            deleted = report.deleted,
            unchanged = report.unchanged,
            bytes = report.bytes_uploaded,
            "Bucket synced"
        );

        if let Err(e) = scratch.close() {
            warn!(error = %e, "Could not remove scratch directory");
        }
        Ok(DeployResolution::Deployed {
            bucket,
            uploaded: report.uploaded,
            deleted: report.deleted,
            unchanged: report.unchanged,
        })
    }
}

impl std::fmt::Debug for Deployer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deployer")
            .field("configured", &self.credentials.is_ok())
            .field("scratch_root", &self.scratch_root)
            .field("sync_options", &self.sync_options)
            .finish_non_exhaustive()
    }
}

/// Checks the deploy kind and picks the pushed branch's bucket.
fn resolve_bucket(job: &DeployJob) -> Result<BucketName, DeployError> {
    match job.deploy.deploy_kind()? {
        DeployKind::S3 => {}
        other => return Err(DeployError::UnsupportedKind(other)),
    }
    let branch = job
        .git_ref
        .branch()
        .ok_or_else(|| DeployError::NotABranch(job.git_ref.clone()))?;
    Ok(job.deploy.bucket_for(&branch)?)
}
