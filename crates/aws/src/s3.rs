use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, Delete, Object, ObjectIdentifier};
use aws_sdk_s3::Client;
use pipeline::etag::normalize_etag;
use pipeline::{BucketName, CompletedPart, ObjectKey, ObjectStore, ObjectStoreError, RemoteObject};
use tracing::{debug, instrument, warn};

use crate::SdkConfig;

/// Most keys a single `DeleteObjects` request accepts.
pub const DELETE_BATCH_SIZE: usize = 1000;

/// [`ObjectStore`] backed by S3.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn store_error<E, R>(bucket: &BucketName, err: SdkError<E, R>) -> ObjectStoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match err.code() {
        Some("NoSuchBucket") | Some("AccessDenied") | Some("AllAccessDisabled") => {
            ObjectStoreError::BucketUnavailable(bucket.to_string())
        }
        _ => ObjectStoreError::Request(DisplayErrorContext(&err).to_string()),
    }
}

/// Converts a listing entry; entries without a key are skipped.
fn remote_object(object: &Object) -> Option<RemoteObject> {
    let key = ObjectKey::new(object.key()?)?;
    Some(RemoteObject {
        key,
        size: object.size().and_then(|s| u64::try_from(s).ok()).unwrap_or(0),
        etag: object.e_tag().map(normalize_etag).unwrap_or_default(),
    })
}

fn delete_request(keys: &[ObjectKey]) -> Result<Delete, ObjectStoreError> {
    let objects = keys
        .iter()
        .map(|key| ObjectIdentifier::builder().key(key.as_str()).build())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ObjectStoreError::InvalidResponse(e.to_string()))?;
    Delete::builder()
        .set_objects(Some(objects))
        .quiet(true)
        .build()
        .map_err(|e| ObjectStoreError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self), fields(bucket = %bucket))]
    async fn list_objects(&self, bucket: &BucketName) -> Result<Vec<RemoteObject>, ObjectStoreError> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(bucket.as_str())
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| store_error(bucket, e))?;

            objects.extend(page.contents().iter().filter_map(remote_object));

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }
        debug!(count = objects.len(), "Listed bucket");
        Ok(objects)
    }

    async fn put_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        self.client
            .put_object()
            .bucket(bucket.as_str())
            .key(key.as_str())
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| store_error(bucket, e))?;
        Ok(())
    }

    async fn create_multipart(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        content_type: &str,
    ) -> Result<String, ObjectStoreError> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(bucket.as_str())
            .key(key.as_str())
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| store_error(bucket, e))?;
        output
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| ObjectStoreError::InvalidResponse(format!("no upload id for {key}")))
    }

    async fn upload_part(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        upload_id: &str,
        part_number: i32,
        body: Vec<u8>,
    ) -> Result<String, ObjectStoreError> {
        let output = self
            .client
            .upload_part()
            .bucket(bucket.as_str())
            .key(key.as_str())
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| store_error(bucket, e))?;
        output.e_tag().map(str::to_string).ok_or_else(|| {
            ObjectStoreError::InvalidResponse(format!("no ETag for part {part_number} of {key}"))
        })
    }

    async fn complete_multipart(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<(), ObjectStoreError> {
        let parts = parts
            .into_iter()
            .map(|part| {
                aws_sdk_s3::types::CompletedPart::builder()
                    .part_number(part.part_number)
                    .e_tag(part.etag)
                    .build()
            })
            .collect();
        self.client
            .complete_multipart_upload()
            .bucket(bucket.as_str())
            .key(key.as_str())
            .upload_id(upload_id)
            .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(parts)).build())
            .send()
            .await
            .map_err(|e| store_error(bucket, e))?;
        Ok(())
    }

    async fn abort_multipart(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        upload_id: &str,
    ) -> Result<(), ObjectStoreError> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket.as_str())
            .key(key.as_str())
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| store_error(bucket, e))?;
        Ok(())
    }

    #[instrument(skip(self, keys), fields(bucket = %bucket, count = keys.len()))]
    async fn delete_objects(
        &self,
        bucket: &BucketName,
        keys: &[ObjectKey],
    ) -> Result<(), ObjectStoreError> {
        for batch in keys.chunks(DELETE_BATCH_SIZE) {
            let output = self
                .client
                .delete_objects()
                .bucket(bucket.as_str())
                .delete(delete_request(batch)?)
                .send()
                .await
                .map_err(|e| store_error(bucket, e))?;

            if let Some(first) = output.errors().first() {
                warn!(failed = output.errors().len(), "Some deletions were refused");
                return Err(ObjectStoreError::Request(format!(
                    "could not delete {}: {}",
                    first.key().unwrap_or("<unknown>"),
                    first.message().unwrap_or("no message")
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(n: usize) -> Vec<ObjectKey> {
        (0..n)
            .map(|i| ObjectKey::new(format!("assets/{i}.js")).unwrap())
            .collect()
    }

    #[test]
    fn test_remote_object_strips_etag_quotes() {
        let object = Object::builder()
            .key("index.html")
            .size(12)
            .e_tag("\"5eb63bbbe01eeed093cb22bb8f5acdc3\"")
            .build();
        let remote = remote_object(&object).unwrap();
        assert_eq!(remote.key.as_str(), "index.html");
        assert_eq!(remote.size, 12);
        assert_eq!(remote.etag, "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn test_remote_object_without_key_is_skipped() {
        assert!(remote_object(&Object::builder().size(1).build()).is_none());
    }

    #[test]
    fn test_delete_request_is_quiet_and_complete() {
        let delete = delete_request(&keys(3)).unwrap();
        assert_eq!(delete.quiet(), Some(true));
        let sent: Vec<&str> = delete.objects().iter().map(|o| o.key()).collect();
        assert_eq!(sent, ["assets/0.js", "assets/1.js", "assets/2.js"]);
    }

    #[test]
    fn test_delete_batches_respect_service_limit() {
        let all = keys(2_500);
        let sizes: Vec<usize> = all.chunks(DELETE_BATCH_SIZE).map(<[_]>::len).collect();
        assert_eq!(sizes, [1000, 1000, 500]);
    }
}
