//! In-memory implementations of every port.
//!
//! Compiled for this crate's own tests and, through the `test-support`
//! feature, for the tests of the service crates.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::errors::{ErrorLogError, ObjectStoreError, PublishError, SourceError};
use crate::etag::{multipart_etag, single_part_etag};
use crate::ports::{CompletedPart, RemoteObject};
use crate::{
    BucketName, DeployJob, ErrorLog, ErrorRecord, GitRef, JobPublisher, ObjectKey, ObjectStore,
    RepositoryRef, SourceRepository,
};

// ---------------------------------------------------------------------------
// Source repository
// ---------------------------------------------------------------------------

/// Serves files and archives from memory.
#[derive(Default)]
pub struct InMemorySource {
    files: Mutex<HashMap<(String, String, String), Vec<u8>>>,
    archives: Mutex<HashMap<(String, String), Vec<u8>>>,
    fetch_calls: AtomicUsize,
    download_calls: AtomicUsize,
    transport_failure: Mutex<Option<String>>,
}

impl InMemorySource {
    pub fn with_file(self, repo: &RepositoryRef, path: &str, git_ref: &GitRef, body: &[u8]) -> Self {
        self.files.lock().unwrap().insert(
            (repo.to_string(), path.to_string(), git_ref.to_string()),
            body.to_vec(),
        );
        self
    }

    pub fn with_archive(self, repo: &RepositoryRef, git_ref: &GitRef, zip: Vec<u8>) -> Self {
        self.set_archive(repo, git_ref, zip);
        self
    }

    /// Replaces the archive served for `repo` at `git_ref`.
    pub fn set_archive(&self, repo: &RepositoryRef, git_ref: &GitRef, zip: Vec<u8>) {
        self.archives
            .lock()
            .unwrap()
            .insert((repo.to_string(), git_ref.to_string()), zip);
    }

    /// Makes every subsequent call fail as a transport error.
    pub fn fail_transport(&self, message: &str) {
        *self.transport_failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    fn check_transport(&self) -> Result<(), SourceError> {
        match self.transport_failure.lock().unwrap().clone() {
            Some(message) => Err(SourceError::Transport {
                message,
                retry_after: None,
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SourceRepository for InMemorySource {
    async fn fetch_file(
        &self,
        repo: &RepositoryRef,
        path: &str,
        git_ref: &GitRef,
    ) -> Result<Vec<u8>, SourceError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.check_transport()?;
        self.files
            .lock()
            .unwrap()
            .get(&(repo.to_string(), path.to_string(), git_ref.to_string()))
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("{repo}/{path}@{git_ref}")))
    }

    async fn download_archive(
        &self,
        repo: &RepositoryRef,
        git_ref: &GitRef,
        dest: &Path,
    ) -> Result<u64, SourceError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        self.check_transport()?;
        let zip = self
            .archives
            .lock()
            .unwrap()
            .get(&(repo.to_string(), git_ref.to_string()))
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("{repo}@{git_ref}")))?;
        tokio::fs::write(dest, &zip).await?;
        Ok(zip.len() as u64)
    }
}

// ---------------------------------------------------------------------------
// Job publisher
// ---------------------------------------------------------------------------

/// Records published jobs.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, DeployJob)>>,
    fail: Mutex<bool>,
}

impl RecordingPublisher {
    /// Makes every subsequent publish fail.
    pub fn fail_publishes(&self) {
        *self.fail.lock().unwrap() = true;
    }

    /// `(topic_arn, job)` pairs in publish order.
    pub fn published(&self) -> Vec<(String, DeployJob)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobPublisher for RecordingPublisher {
    async fn publish(&self, topic_arn: &str, job: &DeployJob) -> Result<String, PublishError> {
        if *self.fail.lock().unwrap() {
            return Err(PublishError::Request {
                topic: topic_arn.to_string(),
                message: "topic does not exist".to_string(),
            });
        }
        let mut published = self.published.lock().unwrap();
        published.push((topic_arn.to_string(), job.clone()));
        Ok(format!("message-{}", published.len()))
    }
}

// ---------------------------------------------------------------------------
// Object store
// ---------------------------------------------------------------------------

/// An object held by [`InMemoryObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
    pub etag: String,
}

struct PendingUpload {
    bucket: String,
    key: String,
    content_type: String,
    parts: BTreeMap<i32, Vec<u8>>,
}

/// Buckets held in memory, with entity tags computed the way the real store does.
#[derive(Default)]
pub struct InMemoryObjectStore {
    buckets: Mutex<HashMap<String, BTreeMap<String, StoredObject>>>,
    uploads: Mutex<HashMap<String, PendingUpload>>,
    next_upload: AtomicUsize,
    writes: AtomicUsize,
    multipart_completions: AtomicUsize,
    aborts: AtomicUsize,
    fail_parts: Mutex<bool>,
}

impl InMemoryObjectStore {
    /// Creates an empty bucket.
    pub fn with_bucket(self, bucket: &str) -> Self {
        self.buckets
            .lock()
            .unwrap()
            .insert(bucket.to_string(), BTreeMap::new());
        self
    }

    /// Places an object directly, bypassing the write counters.
    pub fn insert(&self, bucket: &str, key: &str, body: &[u8]) {
        self.buckets
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_default()
            .insert(
                key.to_string(),
                StoredObject {
                    body: body.to_vec(),
                    content_type: "application/octet-stream".to_string(),
                    etag: single_part_etag(body),
                },
            );
    }

    /// Snapshot of a bucket's contents.
    pub fn objects(&self, bucket: &str) -> BTreeMap<String, StoredObject> {
        self.buckets
            .lock()
            .unwrap()
            .get(bucket)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of completed object writes (single or multipart).
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn multipart_completions(&self) -> usize {
        self.multipart_completions.load(Ordering::SeqCst)
    }

    pub fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    /// Uploads still open (neither completed nor aborted).
    pub fn pending_uploads(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    /// Makes every subsequent part upload fail.
    pub fn fail_part_uploads(&self) {
        *self.fail_parts.lock().unwrap() = true;
    }

    fn require_bucket(&self, bucket: &BucketName) -> Result<(), ObjectStoreError> {
        if self.buckets.lock().unwrap().contains_key(bucket.as_str()) {
            Ok(())
        } else {
            Err(ObjectStoreError::BucketUnavailable(bucket.to_string()))
        }
    }

    fn store(&self, bucket: &str, key: &str, object: StoredObject) {
        self.buckets
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), object);
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn list_objects(&self, bucket: &BucketName) -> Result<Vec<RemoteObject>, ObjectStoreError> {
        self.require_bucket(bucket)?;
        let objects = self.objects(bucket.as_str());
        Ok(objects
            .into_iter()
            .filter_map(|(key, object)| {
                Some(RemoteObject {
                    key: ObjectKey::new(key)?,
                    size: object.body.len() as u64,
                    etag: object.etag,
                })
            })
            .collect())
    }

    async fn put_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        self.require_bucket(bucket)?;
        let etag = single_part_etag(&body);
        self.store(
            bucket.as_str(),
            key.as_str(),
            StoredObject {
                body,
                content_type: content_type.to_string(),
                etag,
            },
        );
        Ok(())
    }

    async fn create_multipart(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        content_type: &str,
    ) -> Result<String, ObjectStoreError> {
        self.require_bucket(bucket)?;
        let upload_id = format!("upload-{}", self.next_upload.fetch_add(1, Ordering::SeqCst));
        self.uploads.lock().unwrap().insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                content_type: content_type.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _bucket: &BucketName,
        _key: &ObjectKey,
        upload_id: &str,
        part_number: i32,
        body: Vec<u8>,
    ) -> Result<String, ObjectStoreError> {
        if *self.fail_parts.lock().unwrap() {
            return Err(ObjectStoreError::Request("connection reset".to_string()));
        }
        let etag = single_part_etag(&body);
        let mut uploads = self.uploads.lock().unwrap();
        let upload = uploads
            .get_mut(upload_id)
            .ok_or_else(|| ObjectStoreError::InvalidResponse(format!("no upload {upload_id}")))?;
        upload.parts.insert(part_number, body);
        Ok(etag)
    }

    async fn complete_multipart(
        &self,
        _bucket: &BucketName,
        _key: &ObjectKey,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<(), ObjectStoreError> {
        let upload = self
            .uploads
            .lock()
            .unwrap()
            .remove(upload_id)
            .ok_or_else(|| ObjectStoreError::InvalidResponse(format!("no upload {upload_id}")))?;

        let mut bodies = Vec::with_capacity(parts.len());
        for part in &parts {
            let body = upload.parts.get(&part.part_number).ok_or_else(|| {
                ObjectStoreError::InvalidResponse(format!("part {} missing", part.part_number))
            })?;
            if single_part_etag(body) != part.etag {
                return Err(ObjectStoreError::InvalidResponse(format!(
                    "part {} etag mismatch",
                    part.part_number
                )));
            }
            bodies.push(body.as_slice());
        }

        let etag = multipart_etag(bodies.iter().copied());
        let body = bodies.concat();
        self.store(
            &upload.bucket,
            &upload.key,
            StoredObject {
                body,
                content_type: upload.content_type,
                etag,
            },
        );
        self.multipart_completions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn abort_multipart(
        &self,
        _bucket: &BucketName,
        _key: &ObjectKey,
        upload_id: &str,
    ) -> Result<(), ObjectStoreError> {
        self.uploads.lock().unwrap().remove(upload_id);
        self.aborts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_objects(
        &self,
        bucket: &BucketName,
        keys: &[ObjectKey],
    ) -> Result<(), ObjectStoreError> {
        self.require_bucket(bucket)?;
        let mut buckets = self.buckets.lock().unwrap();
        if let Some(objects) = buckets.get_mut(bucket.as_str()) {
            for key in keys {
                objects.remove(key.as_str());
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error log
// ---------------------------------------------------------------------------

/// Keeps every appended record.
#[derive(Default)]
pub struct RecordingErrorLog {
    records: Mutex<Vec<ErrorRecord>>,
}

impl RecordingErrorLog {
    pub fn records(&self) -> Vec<ErrorRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl ErrorLog for RecordingErrorLog {
    async fn append(&self, record: &ErrorRecord) -> Result<(), ErrorLogError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}
