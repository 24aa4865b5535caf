use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};
use std::collections::HashMap;
use tokio::io::AsyncRead;

use crate::models::object::{BucketName, ObjectKey};

/// Body of a fetched object, yielded in chunks as it arrives.
pub type ObjectBody = BoxStream<'static, Result<Bytes, StorageError>>;

/// Source of an object's bytes on upload.
pub type ObjectSource<'a> = &'a mut (dyn AsyncRead + Send + Unpin);

/// Object storage capability the transfer component is built on.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open an object for reading. Resolves once the object is known to
    /// exist; the body is streamed afterwards.
    async fn get(&self, bucket: &BucketName, key: &ObjectKey) -> Result<ObjectBody, StorageError>;

    /// Stream `source` into `key`, replacing any existing object. Returns the
    /// number of bytes stored.
    async fn put(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        source: ObjectSource<'_>,
        content_type: &str,
    ) -> Result<u64, StorageError>;

    /// Make an existing object publicly readable. `content_type` is the
    /// object's current type and must survive the change.
    async fn set_public(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        content_type: &str,
    ) -> Result<(), StorageError>;
}

/// S3-compatible storage client (R2, MinIO, GCS interoperability).
pub struct S3ObjectStore {
    buckets: HashMap<BucketName, Box<Bucket>>,
}

impl S3ObjectStore {
    /// Build one bucket handle per configured bucket name.
    pub fn new(
        buckets: &[&BucketName],
        region: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: region.to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        let mut handles = HashMap::new();
        for name in buckets {
            let bucket = Bucket::new(name.as_str(), region.clone(), credentials.clone())
                .map_err(|e| StorageError::Config(e.to_string()))?;
            handles.insert((*name).clone(), bucket);
        }

        Ok(Self { buckets: handles })
    }

    /// Address buckets as `<endpoint>/<bucket>` instead of
    /// `<bucket>.<endpoint>`. MinIO and most self-hosted endpoints need this.
    pub fn with_path_style(self) -> Self {
        let buckets = self
            .buckets
            .into_iter()
            .map(|(name, bucket)| (name, bucket.with_path_style()))
            .collect();
        Self { buckets }
    }

    fn bucket(&self, name: &BucketName) -> Result<&Bucket, StorageError> {
        self.buckets
            .get(name)
            .map(|b| b.as_ref())
            .ok_or_else(|| StorageError::Config(format!("bucket {name} is not configured")))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, bucket: &BucketName, key: &ObjectKey) -> Result<ObjectBody, StorageError> {
        let response = self
            .bucket(bucket)?
            .get_object_stream(key.as_str())
            .await
            .map_err(|e| StorageError::from_s3(e, bucket, key))?;
        check_status(response.status_code, bucket, key)?;

        let (bucket, key) = (bucket.clone(), key.clone());
        Ok(response
            .bytes
            .map_err(move |e| StorageError::from_s3(e, &bucket, &key))
            .boxed())
    }

    async fn put(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        mut source: ObjectSource<'_>,
        content_type: &str,
    ) -> Result<u64, StorageError> {
        let response = self
            .bucket(bucket)?
            .put_object_stream_with_content_type(&mut source, key.as_str(), content_type)
            .await
            .map_err(|e| StorageError::from_s3(e, bucket, key))?;
        check_status(response.status_code(), bucket, key)?;
        Ok(response.uploaded_bytes() as u64)
    }

    async fn set_public(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        content_type: &str,
    ) -> Result<(), StorageError> {
        // Self-copy with a canned ACL; S3 only accepts it with REPLACE, which
        // also resets metadata, so the content type is sent again.
        let mut handle = self.bucket(bucket)?.clone();
        handle.add_header("x-amz-acl", "public-read");
        handle.add_header("x-amz-metadata-directive", "REPLACE");
        handle.add_header("content-type", content_type);

        let status = handle
            .copy_object_internal(key.as_str(), key.as_str())
            .await
            .map_err(|e| StorageError::from_s3(e, bucket, key))?;
        check_status(status, bucket, key)
    }
}

fn check_status(status: u16, bucket: &BucketName, key: &ObjectKey) -> Result<(), StorageError> {
    match status {
        200..=299 => Ok(()),
        404 => Err(StorageError::NotFound(format!("{bucket}/{key}"))),
        401 | 403 => Err(StorageError::PermissionDenied(format!("{bucket}/{key}"))),
        408 | 429 | 500..=599 => Err(StorageError::Transient(format!(
            "{bucket}/{key}: status {status}"
        ))),
        400..=499 => Err(StorageError::Rejected(format!("{bucket}/{key}: status {status}"))),
        other => Err(StorageError::Transient(format!(
            "{bucket}/{key}: unexpected status {other}"
        ))),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    PermissionDenied(String),

    #[error("Storage temporarily unavailable: {0}")]
    Transient(String),

    /// The backend refused the request itself; resending it cannot succeed.
    #[error("Request rejected by storage: {0}")]
    Rejected(String),

    #[error("Storage configuration error: {0}")]
    Config(String),
}

impl StorageError {
    fn from_s3(err: S3Error, bucket: &BucketName, key: &ObjectKey) -> Self {
        match err {
            S3Error::HttpFailWithBody(status, body) => match check_status(status, bucket, key) {
                Err(StorageError::Transient(_)) => {
                    StorageError::Transient(format!("{bucket}/{key}: status {status}: {body}"))
                }
                Err(StorageError::Rejected(_)) => {
                    StorageError::Rejected(format!("{bucket}/{key}: status {status}: {body}"))
                }
                Err(classified) => classified,
                Ok(()) => StorageError::Transient(format!("{bucket}/{key}: {body}")),
            },
            other => StorageError::Transient(format!("{bucket}/{key}: {other}")),
        }
    }
}
