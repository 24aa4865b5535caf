use futures::StreamExt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::config::{PipelineConfig, StepTimeouts, VisibilityPolicy};
use crate::models::job::{Job, StagedFile, StagedRole, Visibility};
use crate::models::object::{BucketName, ObjectKey};
use crate::services::staging::{StagingArea, StagingError};
use crate::services::storage::{ObjectStore, StorageError};

/// Moves objects between storage and the staging area.
pub struct TransferService {
    store: Arc<dyn ObjectStore>,
    staging: StagingArea,
    raw_bucket: BucketName,
    processed_bucket: BucketName,
    timeouts: StepTimeouts,
    visibility: VisibilityPolicy,
}

/// Outcome of a successful upload. Visibility is reported separately so a
/// failed ACL change never hides a completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub uploaded: bool,
    pub visibility: Visibility,
}

impl TransferService {
    pub fn new(store: Arc<dyn ObjectStore>, staging: StagingArea, config: &PipelineConfig) -> Self {
        Self {
            store,
            staging,
            raw_bucket: config.raw_bucket.clone(),
            processed_bucket: config.processed_bucket.clone(),
            timeouts: config.timeouts,
            visibility: config.visibility,
        }
    }

    /// Fetch the job's source object into its raw staged path.
    pub async fn download(&self, job: &Job) -> Result<StagedFile, TransferError> {
        let start = Instant::now();
        let fetch = async {
            let mut body = self.store.get(&self.raw_bucket, job.source_key()).await?;

            // Only touch disk once the object is known to exist.
            let path = self.staging.acquire_path(job, StagedRole::Raw).await?;
            let mut file = File::create(&path)
                .await
                .map_err(|e| TransferError::local(&path, e))?;
            let mut bytes = 0u64;
            while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                file.write_all(&chunk)
                    .await
                    .map_err(|e| TransferError::local(&path, e))?;
                bytes += chunk.len() as u64;
            }
            file.flush().await.map_err(|e| TransferError::local(&path, e))?;
            Ok::<_, TransferError>((path, bytes))
        };
        let (path, bytes) = with_deadline(self.timeouts.download, "download", fetch).await?;

        tracing::info!(
            job_id = %job.id(),
            bucket = %self.raw_bucket,
            key = %job.source_key(),
            path = %path.display(),
            bytes,
            duration_ms = start.elapsed().as_millis() as u64,
            "Source video downloaded"
        );

        Ok(StagedFile {
            job_id: job.id(),
            role: StagedRole::Raw,
            path,
        })
    }

    /// Push a staged file to the processed bucket, then optionally make it
    /// public as a separate step.
    pub async fn upload(
        &self,
        staged: &StagedFile,
        target_key: &ObjectKey,
        make_public: bool,
    ) -> Result<UploadReport, TransferError> {
        let start = Instant::now();
        let content_type = content_type_for(target_key);
        let mut file = File::open(&staged.path)
            .await
            .map_err(|e| TransferError::local(&staged.path, e))?;

        let bytes = with_deadline(
            self.timeouts.upload,
            "upload",
            self.store
                .put(&self.processed_bucket, target_key, &mut file, content_type),
        )
        .await?;

        tracing::info!(
            job_id = %staged.job_id,
            bucket = %self.processed_bucket,
            key = %target_key,
            bytes,
            duration_ms = start.elapsed().as_millis() as u64,
            "Processed video uploaded"
        );

        let visibility = if make_public {
            self.make_public(target_key).await
        } else {
            Visibility::Skipped
        };

        Ok(UploadReport {
            uploaded: true,
            visibility,
        })
    }

    /// Mark an uploaded object public, retrying transient failures with
    /// exponential backoff.
    pub async fn make_public(&self, target_key: &ObjectKey) -> Visibility {
        let mut backoff = self.visibility.initial_backoff;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = with_deadline(
                self.timeouts.upload,
                "set-public",
                self.store
                    .set_public(&self.processed_bucket, target_key, content_type_for(target_key)),
            )
            .await;

            match result {
                Ok(()) => {
                    tracing::info!(key = %target_key, attempt, "Processed video is now public");
                    return Visibility::Public;
                }
                Err(e) if e.is_retryable() && attempt < self.visibility.attempts => {
                    tracing::warn!(
                        key = %target_key,
                        attempt,
                        error = %e,
                        "Failed to make video public, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => {
                    tracing::error!(key = %target_key, attempt, error = %e, "Failed to make video public");
                    metrics::counter!("video_visibility_failures").increment(1);
                    return Visibility::Failed {
                        attempts: attempt,
                        reason: e.to_string(),
                    };
                }
            }
        }
    }
}

async fn with_deadline<T, E>(
    deadline: Duration,
    operation: &'static str,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, TransferError>
where
    E: Into<TransferError>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(TransferError::Transient(format!(
            "{operation} did not finish within {}s",
            deadline.as_secs_f64()
        ))),
    }
}

fn content_type_for(key: &ObjectKey) -> &'static str {
    let ext = key
        .file_name()
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    PermissionDenied(String),

    #[error("Transient transfer failure: {0}")]
    Transient(String),

    #[error("Local I/O failure: {0}")]
    LocalIo(String),
}

impl TransferError {
    fn local(path: &Path, err: std::io::Error) -> Self {
        TransferError::LocalIo(format!("{}: {err}", path.display()))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, TransferError::Transient(_))
    }
}

impl From<StorageError> for TransferError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(msg) => TransferError::NotFound(msg),
            StorageError::PermissionDenied(msg) => TransferError::PermissionDenied(msg),
            StorageError::Transient(msg) => TransferError::Transient(msg),
            // Neither a refused request nor a misconfigured backend will fix
            // itself on retry.
            StorageError::Rejected(msg) | StorageError::Config(msg) => {
                TransferError::PermissionDenied(msg)
            }
        }
    }
}

impl From<StagingError> for TransferError {
    fn from(err: StagingError) -> Self {
        TransferError::LocalIo(err.to_string())
    }
}
