//! One-way mirror of a local directory into a bucket.
//!
//! Files whose size and entity tag already match the remote object are
//! skipped, so running the same sync twice writes nothing the second time.
//! Remote objects with no local counterpart are deleted: the bucket belongs
//! to the deploy target.

use std::collections::{BTreeMap, HashSet};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use pipeline::etag::EtagBuilder;
use pipeline::{
    BucketName, CompletedPart, ObjectKey, ObjectStore, ObjectStoreError, RemoteObject, RetryPolicy,
};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, instrument, warn};

const MIB: u64 = 1024 * 1024;
const READ_BUFFER: usize = 1024 * 1024;

/// Tuning for [`mirror`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Size of each part of a multipart upload.
    pub part_size: u64,
    /// Files larger than this are uploaded in parts.
    pub multipart_threshold: u64,
    /// Uploads in flight at once.
    pub concurrency: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            part_size: 100 * MIB,
            multipart_threshold: 100 * MIB,
            concurrency: 4,
        }
    }
}

impl SyncOptions {
    /// Uses `part_size_mib` for both the part size and the threshold.
    pub fn with_part_size_mib(mut self, part_size_mib: u64) -> Self {
        self.part_size = part_size_mib.max(1) * MIB;
        self.multipart_threshold = self.part_size;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("local file access failed: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Store(#[from] ObjectStoreError),

    #[error("{} cannot be used as an object key", .0.display())]
    InvalidPath(PathBuf),
}

impl SyncError {
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Io(_) => RetryPolicy::retry(),
            Self::Store(e) => e.retry_policy(),
            Self::InvalidPath(_) => RetryPolicy::NonRetryable,
        }
    }
}

// ---------------------------------------------------------------------------
// Local scan
// ---------------------------------------------------------------------------

/// A file in the local tree, described the way the store will describe it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub key: ObjectKey,
    pub path: PathBuf,
    pub size: u64,
    pub etag: String,
    pub content_type: String,
}

/// Walks `dir`, returning every regular file ordered by key.
///
/// Keys are paths relative to `dir` joined with `/`.
pub fn scan_local(dir: &Path, options: &SyncOptions) -> Result<Vec<LocalFile>, SyncError> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let path = entry.path();
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                files.push(describe(dir, path, options)?);
            }
        }
    }
    files.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(files)
}

fn object_key(root: &Path, path: &Path) -> Option<ObjectKey> {
    let relative = path.strip_prefix(root).ok()?;
    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    ObjectKey::new(parts.join("/"))
}

fn describe(root: &Path, path: PathBuf, options: &SyncOptions) -> Result<LocalFile, SyncError> {
    let key = object_key(root, &path).ok_or_else(|| SyncError::InvalidPath(path.clone()))?;

    let mut etag = EtagBuilder::new(options.part_size, options.multipart_threshold);
    let mut file = std::fs::File::open(&path)?;
    let mut buffer = vec![0u8; READ_BUFFER];
    let mut size = 0u64;
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        etag.update(&buffer[..read]);
        size += read as u64;
    }

    let content_type = mime_guess::from_path(&path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    Ok(LocalFile {
        key,
        path,
        size,
        etag: etag.finish(),
        content_type,
    })
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub uploads: Vec<LocalFile>,
    pub deletes: Vec<ObjectKey>,
    pub unchanged: usize,
}

/// Decides which files to upload and which remote keys to delete.
pub fn plan(local: Vec<LocalFile>, remote: &[RemoteObject]) -> SyncPlan {
    let remote_by_key: BTreeMap<&str, &RemoteObject> =
        remote.iter().map(|o| (o.key.as_str(), o)).collect();
    let local_keys: HashSet<String> = local.iter().map(|f| f.key.to_string()).collect();

    let mut result = SyncPlan::default();
    for file in local {
        match remote_by_key.get(file.key.as_str()) {
            Some(existing)
                if existing.size == file.size && existing.etag.eq_ignore_ascii_case(&file.etag) =>
            {
                result.unchanged += 1;
            }
            _ => result.uploads.push(file),
        }
    }
    result.deletes = remote
        .iter()
        .filter(|o| !local_keys.contains(o.key.as_str()))
        .map(|o| o.key.clone())
        .collect();
    result
}

// ---------------------------------------------------------------------------
// Mirror
// ---------------------------------------------------------------------------

/// Upload progress, reported after each file completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncProgress {
    pub files_done: usize,
    pub files_total: usize,
    pub bytes_done: u64,
    pub bytes_total: u64,
}

/// Progress callback that logs at debug level.
pub fn log_progress(progress: SyncProgress) {
    debug!(
        files_done = progress.files_done,
        files_total = progress.files_total,
        bytes_done = progress.bytes_done,
        bytes_total = progress.bytes_total,
        "Sync progress"
    );
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub uploaded: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub bytes_uploaded: u64,
}

/// Makes `bucket` hold exactly the files under `dir`.
///
/// Deletions run only after every upload succeeded, so a failed sync never
/// removes objects the new tree still needs.
#[instrument(skip_all, fields(bucket = %bucket, dir = %dir.display()))]
pub async fn mirror(
    store: &dyn ObjectStore,
    bucket: &BucketName,
    dir: &Path,
    options: &SyncOptions,
    progress: &(dyn Fn(SyncProgress) + Send + Sync),
) -> Result<SyncReport, SyncError> {
    let local = {
        let dir = dir.to_path_buf();
        let options = options.clone();
        tokio::task::spawn_blocking(move || scan_local(&dir, &options))
            .await
            .map_err(io::Error::other)??
    };
    let remote = store.list_objects(bucket).await?;
    let plan = plan(local, &remote);
    info!(
        uploads = plan.uploads.len(),
        deletes = plan.deletes.len(),
        unchanged = plan.unchanged,
        "Sync planned"
    );

    let mut state = SyncProgress {
        files_total: plan.uploads.len(),
        bytes_total: plan.uploads.iter().map(|f| f.size).sum(),
        ..SyncProgress::default()
    };
    let mut first_error = None;
    // Items are owned: a stream of borrowed files makes this future !Send.
    let mut uploads = stream::iter(plan.uploads.iter().cloned())
        .map(|file| async move { upload(store, bucket, &file, options).await.map(|()| file.size) })
        .buffer_unordered(options.concurrency.max(1));
    // Drain every upload so each one finishes or aborts its own multipart.
    while let Some(result) = uploads.next().await {
        match result {
            Ok(size) => {
                state.files_done += 1;
                state.bytes_done += size;
                progress(state);
            }
            Err(e) => {
                warn!(error = %e, "Upload failed");
                first_error.get_or_insert(e);
            }
        }
    }
    drop(uploads);
    if let Some(e) = first_error {
        return Err(e);
    }

    if !plan.deletes.is_empty() {
        store.delete_objects(bucket, &plan.deletes).await?;
    }

    Ok(SyncReport {
        uploaded: state.files_done,
        deleted: plan.deletes.len(),
        unchanged: plan.unchanged,
        bytes_uploaded: state.bytes_done,
    })
}

async fn upload(
    store: &dyn ObjectStore,
    bucket: &BucketName,
    file: &LocalFile,
    options: &SyncOptions,
) -> Result<(), SyncError> {
    if file.size <= options.multipart_threshold {
        let body = tokio::fs::read(&file.path).await?;
        store
            .put_object(bucket, &file.key, body, &file.content_type)
            .await?;
        return Ok(());
    }

    let upload_id = store
        .create_multipart(bucket, &file.key, &file.content_type)
        .await?;
    match upload_parts(store, bucket, file, &upload_id, options.part_size).await {
        Ok(parts) => {
            store
                .complete_multipart(bucket, &file.key, &upload_id, parts)
                .await?;
            Ok(())
        }
        Err(e) => {
            if let Err(abort) = store.abort_multipart(bucket, &file.key, &upload_id).await {
                warn!(key = %file.key, error = %abort, "Could not abort multipart upload");
            }
            Err(e)
        }
    }
}

async fn upload_parts(
    store: &dyn ObjectStore,
    bucket: &BucketName,
    file: &LocalFile,
    upload_id: &str,
    part_size: u64,
) -> Result<Vec<CompletedPart>, SyncError> {
    let mut reader = tokio::fs::File::open(&file.path).await?;
    let mut parts = Vec::new();
    let mut part_number = 1;
    loop {
        let mut body = Vec::new();
        (&mut reader).take(part_size).read_to_end(&mut body).await?;
        if body.is_empty() {
            break;
        }
        let etag = store
            .upload_part(bucket, &file.key, upload_id, part_number, body)
            .await?;
        parts.push(CompletedPart { part_number, etag });
        part_number += 1;
    }
    debug!(key = %file.key, parts = parts.len(), "Uploaded parts");
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Mutex;

    use pipeline::etag::single_part_etag;
    use pipeline::testing::InMemoryObjectStore;

    use super::*;

    fn bucket() -> BucketName {
        BucketName::new("site-dev").unwrap()
    }

    fn small_parts() -> SyncOptions {
        SyncOptions {
            part_size: 16,
            multipart_threshold: 16,
            concurrency: 2,
        }
    }

    fn tree(files: &[(&str, &[u8])]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, body) in files {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, body).unwrap();
        }
        dir
    }

    fn remote(key: &str, body: &[u8]) -> RemoteObject {
        RemoteObject {
            key: ObjectKey::new(key).unwrap(),
            size: body.len() as u64,
            etag: single_part_etag(body),
        }
    }

    #[test]
    fn test_scan_builds_keys_and_content_types() {
        let dir = tree(&[
            ("index.html", b"<html></html>"),
            ("css/site.css", b"body{}"),
            ("data/blob", b"\x00\x01"),
        ]);

        let files = scan_local(dir.path(), &SyncOptions::default()).unwrap();

        let keys: Vec<&str> = files.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, ["css/site.css", "data/blob", "index.html"]);
        assert_eq!(files[0].content_type, "text/css");
        assert_eq!(files[1].content_type, "application/octet-stream");
        assert_eq!(files[2].content_type, "text/html");
        assert_eq!(files[2].etag, single_part_etag(b"<html></html>"));
        assert_eq!(files[2].size, 13);
    }

    #[test]
    fn test_scan_etag_follows_multipart_layout() {
        let body: Vec<u8> = (0..40u8).collect();
        let dir = tree(&[("big.bin", &body)]);

        let files = scan_local(dir.path(), &small_parts()).unwrap();

        let expected = pipeline::etag::multipart_etag([&body[..16], &body[16..32], &body[32..]]);
        assert_eq!(files[0].etag, expected);
        assert!(files[0].etag.ends_with("-3"));
    }

    #[test]
    fn test_plan_classifies_files() {
        let dir = tree(&[("same.txt", b"same"), ("changed.txt", b"new"), ("added.txt", b"added")]);
        let local = scan_local(dir.path(), &SyncOptions::default()).unwrap();
        let remote = [
            remote("same.txt", b"same"),
            remote("changed.txt", b"old"),
            remote("removed.txt", b"gone"),
        ];

        let plan = plan(local, &remote);

        let uploads: Vec<&str> = plan.uploads.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(uploads, ["added.txt", "changed.txt"]);
        assert_eq!(plan.deletes, [ObjectKey::new("removed.txt").unwrap()]);
        assert_eq!(plan.unchanged, 1);
    }

    #[tokio::test]
    async fn test_mirror_uploads_then_is_idempotent() {
        let store = InMemoryObjectStore::default().with_bucket("site-dev");
        let dir = tree(&[("index.html", b"<h1>v1</h1>"), ("js/app.js", b"console.log(1)")]);

        let first = mirror(&store, &bucket(), dir.path(), &SyncOptions::default(), &log_progress)
            .await
            .unwrap();
        assert_eq!(first.uploaded, 2);
        let writes_after_first = store.writes();
        let snapshot = store.objects("site-dev");

        let second = mirror(&store, &bucket(), dir.path(), &SyncOptions::default(), &log_progress)
            .await
            .unwrap();

        assert_eq!(second, SyncReport { unchanged: 2, ..SyncReport::default() });
        assert_eq!(store.writes(), writes_after_first);
        assert_eq!(store.objects("site-dev"), snapshot);
        assert_eq!(snapshot["index.html"].content_type, "text/html");
    }

    #[tokio::test]
    async fn test_mirror_deletes_removed_files() {
        let store = InMemoryObjectStore::default().with_bucket("site-dev");
        let dir = tree(&[("keep.txt", b"keep"), ("drop.txt", b"drop")]);
        mirror(&store, &bucket(), dir.path(), &SyncOptions::default(), &log_progress)
            .await
            .unwrap();

        fs::remove_file(dir.path().join("drop.txt")).unwrap();
        let report = mirror(&store, &bucket(), dir.path(), &SyncOptions::default(), &log_progress)
            .await
            .unwrap();

        assert_eq!(report.deleted, 1);
        let keys: Vec<String> = store.objects("site-dev").into_keys().collect();
        assert_eq!(keys, ["keep.txt"]);
    }

    #[tokio::test]
    async fn test_mirror_multipart_and_progress() {
        let store = InMemoryObjectStore::default().with_bucket("site-dev");
        let big: Vec<u8> = (0..50u8).collect();
        let dir = tree(&[("big.bin", &big), ("small.txt", b"tiny")]);
        let seen = Mutex::new(Vec::new());
        let record = |p: SyncProgress| seen.lock().unwrap().push(p);

        let report = mirror(&store, &bucket(), dir.path(), &small_parts(), &record)
            .await
            .unwrap();

        assert_eq!(report.uploaded, 2);
        assert_eq!(report.bytes_uploaded, 54);
        assert_eq!(store.multipart_completions(), 1);
        assert_eq!(store.objects("site-dev")["big.bin"].body, big);

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 2);
        let last = seen.last().unwrap();
        assert_eq!((last.files_done, last.files_total), (2, 2));
        assert_eq!(last.bytes_done, last.bytes_total);

        // The locally computed multipart tag matches the stored one.
        let again = mirror(&store, &bucket(), dir.path(), &small_parts(), &log_progress)
            .await
            .unwrap();
        assert_eq!(again.unchanged, 2);
    }

    #[tokio::test]
    async fn test_failed_part_aborts_and_skips_deletes() {
        let store = InMemoryObjectStore::default().with_bucket("site-dev");
        store.insert("site-dev", "stale.txt", b"stale");
        store.fail_part_uploads();
        let big: Vec<u8> = vec![7; 40];
        let dir = tree(&[("big.bin", &big)]);

        let err = mirror(&store, &bucket(), dir.path(), &small_parts(), &log_progress)
            .await
            .unwrap_err();

        assert!(err.retry_policy().is_retryable());
        assert_eq!(store.aborts(), 1);
        assert_eq!(store.pending_uploads(), 0);
        assert!(store.objects("site-dev").contains_key("stale.txt"));
    }

    #[tokio::test]
    async fn test_missing_bucket_fails() {
        let store = InMemoryObjectStore::default();
        let dir = tree(&[("a.txt", b"a")]);

        let err = mirror(&store, &bucket(), dir.path(), &SyncOptions::default(), &log_progress)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Store(ObjectStoreError::BucketUnavailable(_))));
    }
}
