//! Port traits: what the services need from the outside world.
//!
//! Infrastructure crates implement these; the listener and deployer depend
//! only on the traits and receive concrete implementations from the binary.
//! In-memory implementations live in [`crate::testing`].

use std::path::Path;

use async_trait::async_trait;

use crate::errors::{ErrorLogError, ObjectStoreError, PublishError, SourceError};
use crate::{BucketName, DeployJob, ErrorRecord, GitRef, ObjectKey, RepositoryRef};

// ---------------------------------------------------------------------------
// Source control
// ---------------------------------------------------------------------------

/// Read access to the repositories being deployed.
#[async_trait]
pub trait SourceRepository: Send + Sync {
    /// Returns the decoded contents of the file at `path` in `repo` at `git_ref`.
    async fn fetch_file(
        &self,
        repo: &RepositoryRef,
        path: &str,
        git_ref: &GitRef,
    ) -> Result<Vec<u8>, SourceError>;

    /// Downloads a zip snapshot of `repo` at `git_ref` into the file `dest`.
    ///
    /// Returns the number of bytes written.
    async fn download_archive(
        &self,
        repo: &RepositoryRef,
        git_ref: &GitRef,
        dest: &Path,
    ) -> Result<u64, SourceError>;
}

// ---------------------------------------------------------------------------
// Job queue
// ---------------------------------------------------------------------------

/// Hands deploy jobs to the asynchronous queue feeding the deployer.
#[async_trait]
pub trait JobPublisher: Send + Sync {
    /// Publishes `job` to the topic `topic_arn`, returning the queue's message id.
    async fn publish(&self, topic_arn: &str, job: &DeployJob) -> Result<String, PublishError>;
}

// ---------------------------------------------------------------------------
// Object storage
// ---------------------------------------------------------------------------

/// An object as listed in a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: ObjectKey,
    pub size: u64,
    /// Entity tag as reported by the store, without surrounding quotes.
    pub etag: String,
}

/// One uploaded part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// 1-based part number.
    pub part_number: i32,
    pub etag: String,
}

/// A key/value object store organised into buckets.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Lists every object in `bucket`.
    async fn list_objects(&self, bucket: &BucketName) -> Result<Vec<RemoteObject>, ObjectStoreError>;

    /// Writes `body` to `key` in a single request.
    async fn put_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ObjectStoreError>;

    /// Starts a multipart upload, returning its upload id.
    async fn create_multipart(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        content_type: &str,
    ) -> Result<String, ObjectStoreError>;

    /// Uploads one part, returning the part's entity tag.
    async fn upload_part(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        upload_id: &str,
        part_number: i32,
        body: Vec<u8>,
    ) -> Result<String, ObjectStoreError>;

    /// Assembles the uploaded parts into the final object.
    async fn complete_multipart(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<(), ObjectStoreError>;

    /// Discards a multipart upload and any parts uploaded so far.
    async fn abort_multipart(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        upload_id: &str,
    ) -> Result<(), ObjectStoreError>;

    /// Deletes `keys` from `bucket`. Keys that do not exist are ignored.
    async fn delete_objects(
        &self,
        bucket: &BucketName,
        keys: &[ObjectKey],
    ) -> Result<(), ObjectStoreError>;
}

// ---------------------------------------------------------------------------
// Error log
// ---------------------------------------------------------------------------

/// Durable, append-only store of [`ErrorRecord`]s with time-based expiry.
#[async_trait]
pub trait ErrorLog: Send + Sync {
    async fn append(&self, record: &ErrorRecord) -> Result<(), ErrorLogError>;
}
