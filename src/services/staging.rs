use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::models::job::{Job, JobId, StagedRole};

/// Job-scoped scratch space on local disk.
///
/// Every job gets its own directory under each role root, so concurrent jobs
/// never touch the same path and no locking is needed between them.
#[derive(Debug, Clone)]
pub struct StagingArea {
    raw_root: PathBuf,
    processed_root: PathBuf,
}

impl StagingArea {
    pub fn new(raw_root: impl Into<PathBuf>, processed_root: impl Into<PathBuf>) -> Self {
        Self {
            raw_root: raw_root.into(),
            processed_root: processed_root.into(),
        }
    }

    pub fn root(&self, role: StagedRole) -> &Path {
        match role {
            StagedRole::Raw => &self.raw_root,
            StagedRole::Processed => &self.processed_root,
        }
    }

    fn job_dir(&self, job_id: JobId, role: StagedRole) -> PathBuf {
        self.root(role).join(job_id.to_string())
    }

    /// Path a job's file for `role` lives at. No I/O.
    pub fn path_for(&self, job: &Job, role: StagedRole) -> PathBuf {
        let file_name = match role {
            StagedRole::Raw => job.source_key().file_name(),
            StagedRole::Processed => job.target_key().file_name(),
        };
        self.job_dir(job.id(), role).join(file_name)
    }

    /// Return the path for `(job, role)`, creating its parent directories.
    /// Safe to call repeatedly; always yields the same path.
    pub async fn acquire_path(&self, job: &Job, role: StagedRole) -> Result<PathBuf, StagingError> {
        let dir = self.job_dir(job.id(), role);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StagingError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        Ok(self.path_for(job, role))
    }

    /// Whether anything is staged for `(job_id, role)`.
    pub async fn exists(&self, job_id: JobId, role: StagedRole) -> bool {
        tokio::fs::try_exists(self.job_dir(job_id, role))
            .await
            .unwrap_or(false)
    }

    /// Verify the root for `role` can be created and written to.
    pub async fn check_writable(&self, role: StagedRole) -> Result<(), StagingError> {
        let root = self.root(role);
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|source| StagingError::CreateDir {
                path: root.to_path_buf(),
                source,
            })?;
        let probe = root.join(format!(".probe-{}", JobId::new()));
        tokio::fs::write(&probe, b"")
            .await
            .map_err(|source| StagingError::Unwritable {
                path: root.to_path_buf(),
                source,
            })?;
        if let Err(e) = tokio::fs::remove_file(&probe).await {
            tracing::warn!(path = %probe.display(), error = %e, "Failed to delete staging write-check file");
        }
        Ok(())
    }

    /// Delete whatever is staged for `(job_id, role)`. Absent files are a
    /// no-op; other failures are logged, never returned. The removal runs to
    /// completion even if this future is dropped.
    pub async fn release(&self, job_id: JobId, role: StagedRole) {
        let dir = self.job_dir(job_id, role);
        if let Err(e) = tokio::task::spawn_blocking(move || remove_staged(&dir, job_id, role)).await {
            tracing::warn!(job_id = %job_id, role = %role, error = %e, "Staged file cleanup task failed");
        }
    }

    /// Blocking form of [`StagingArea::release`], for drop paths that cannot
    /// await.
    pub fn release_blocking(&self, job_id: JobId, role: StagedRole) {
        remove_staged(&self.job_dir(job_id, role), job_id, role);
    }
}

fn remove_staged(dir: &Path, job_id: JobId, role: StagedRole) {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {
            tracing::debug!(job_id = %job_id, role = %role, path = %dir.display(), "Staged file deleted");
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::trace!(job_id = %job_id, role = %role, path = %dir.display(), "Nothing staged, skipping delete");
        }
        Err(e) => {
            tracing::warn!(
                job_id = %job_id,
                role = %role,
                path = %dir.display(),
                error = %e,
                "Failed to delete staged file"
            );
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("Failed to create staging directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Staging root {path} is not writable: {source}")]
    Unwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
