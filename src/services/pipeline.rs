//! Per-job coordinator: download, transcode, upload, then cleanup.
//!
//! Cleanup runs on every path out of the pipeline and releases both staged
//! roles, so no terminal state leaves files on local disk. A run that is
//! dropped before it finishes still releases them through [`CleanupGuard`].
//! Jobs are never retried here; a caller that sees a retryable failure
//! submits a new job.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::models::job::{
    FailureKind, Job, JobFailure, JobId, JobReport, JobState, StagedRole, Visibility,
};
use crate::services::staging::StagingArea;
use crate::services::storage::ObjectStore;
use crate::services::transcode::{TranscodeError, TranscodeErrorKind, TranscodeService, Transcoder};
use crate::services::transfer::{TransferError, TransferService};

pub struct Pipeline {
    staging: StagingArea,
    transfer: TransferService,
    transcode: TranscodeService,
}

/// Records state transitions for one job run.
struct Tracker<'a> {
    job: &'a Job,
    transitions: Vec<JobState>,
}

impl<'a> Tracker<'a> {
    fn new(job: &'a Job) -> Self {
        Self {
            job,
            transitions: vec![JobState::Pending],
        }
    }

    fn current(&self) -> JobState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(JobState::Pending)
    }

    fn enter(&mut self, state: JobState) {
        tracing::debug!(job_id = %self.job.id(), from = %self.current(), to = %state, "Job state change");
        self.transitions.push(state);
    }
}

/// Releases a job's staged files if its run is dropped before the cleanup
/// step completes.
struct CleanupGuard<'a> {
    staging: &'a StagingArea,
    job_id: JobId,
    armed: bool,
}

impl<'a> CleanupGuard<'a> {
    fn new(staging: &'a StagingArea, job_id: JobId) -> Self {
        Self {
            staging,
            job_id,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::warn!(job_id = %self.job_id, "Job dropped before cleanup, releasing staged files");
        metrics::counter!("video_jobs_cancelled").increment(1);
        self.staging.release_blocking(self.job_id, StagedRole::Raw);
        self.staging.release_blocking(self.job_id, StagedRole::Processed);
    }
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        engine: Arc<dyn Transcoder>,
        config: &PipelineConfig,
    ) -> Self {
        let staging = StagingArea::new(&config.raw_staging_dir, &config.processed_staging_dir);
        Self {
            transfer: TransferService::new(store, staging.clone(), config),
            transcode: TranscodeService::new(engine, staging.clone(), config.timeouts.transcode),
            staging,
        }
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Run a job to a terminal state and report how it ended.
    pub async fn run(&self, job: &Job) -> JobReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut tracker = Tracker::new(job);
        let mut guard = CleanupGuard::new(&self.staging, job.id());

        tracing::info!(
            job_id = %job.id(),
            source_key = %job.source_key(),
            target_key = %job.target_key(),
            height = job.options().height,
            "Processing video job"
        );
        metrics::counter!("video_jobs_total").increment(1);

        let outcome = self.execute(job, &mut tracker).await;

        tracker.enter(JobState::CleaningUp);
        self.cleanup(job).await;
        guard.disarm();

        let (state, failure, visibility) = match outcome {
            Ok(visibility) => (JobState::Done, None, Some(visibility)),
            Err(failure) => (JobState::Failed, Some(failure), None),
        };
        tracker.enter(state);

        let elapsed = start.elapsed();
        match &failure {
            None => {
                metrics::counter!("video_jobs_completed").increment(1);
                tracing::info!(
                    job_id = %job.id(),
                    duration_ms = elapsed.as_millis() as u64,
                    "Job completed successfully"
                );
            }
            Some(f) => {
                metrics::counter!("video_jobs_failed", "kind" => f.kind.as_ref().to_string())
                    .increment(1);
                tracing::error!(
                    job_id = %job.id(),
                    kind = %f.kind,
                    step = %f.step,
                    retryable = f.kind.is_retryable(),
                    error = %f.message,
                    "Job failed"
                );
            }
        }

        JobReport {
            job_id: job.id(),
            source_key: job.source_key().clone(),
            target_key: job.target_key().clone(),
            state,
            transitions: tracker.transitions,
            failure,
            visibility,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Like [`Pipeline::run`], but a failed job becomes an `Err`. Cleanup has
    /// already happened by the time the error is returned.
    pub async fn run_checked(&self, job: &Job) -> Result<JobReport, PipelineError> {
        let report = self.run(job).await;
        match report.failure.clone() {
            None => Ok(report),
            Some(failure) => Err(PipelineError::Failed { failure, report }),
        }
    }

    async fn execute(&self, job: &Job, tracker: &mut Tracker<'_>) -> Result<Visibility, JobFailure> {
        tracker.enter(JobState::Downloading);
        let step = Instant::now();
        let raw = self
            .transfer
            .download(job)
            .await
            .map_err(|e| transfer_failure(e, tracker.current()))?;
        record_step("download", step);

        tracker.enter(JobState::Transcoding);
        let step = Instant::now();
        let processed = self
            .transcode
            .transform(job, &raw)
            .await
            .map_err(|e| transcode_failure(e, tracker.current()))?;
        record_step("transcode", step);

        tracker.enter(JobState::Uploading);
        let step = Instant::now();
        let upload = self
            .transfer
            .upload(&processed, job.target_key(), job.make_public())
            .await
            .map_err(|e| transfer_failure(e, tracker.current()))?;
        record_step("upload", step);

        Ok(upload.visibility)
    }

    async fn cleanup(&self, job: &Job) {
        self.staging.release(job.id(), StagedRole::Raw).await;
        self.staging.release(job.id(), StagedRole::Processed).await;
    }
}

fn record_step(step: &'static str, start: Instant) {
    metrics::histogram!("video_step_seconds", "step" => step).record(start.elapsed().as_secs_f64());
}

fn transfer_failure(err: TransferError, step: JobState) -> JobFailure {
    let kind = match &err {
        TransferError::NotFound(_) => FailureKind::NotFound,
        TransferError::PermissionDenied(_) => FailureKind::PermissionDenied,
        TransferError::Transient(_) => FailureKind::Transient,
        TransferError::LocalIo(_) => FailureKind::LocalIo,
    };
    JobFailure {
        kind,
        step,
        message: err.to_string(),
    }
}

fn transcode_failure(err: TranscodeError, step: JobState) -> JobFailure {
    let kind = match err.kind {
        TranscodeErrorKind::LocalIo => FailureKind::LocalIo,
        _ => FailureKind::Transcode,
    };
    JobFailure {
        kind,
        step,
        message: err.to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Job {} failed while {} ({}): {}", .report.job_id, .failure.step, .failure.kind, .failure.message)]
    Failed {
        failure: JobFailure,
        report: JobReport,
    },
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Failed { failure, .. } => failure.kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_failure_kinds() {
        let f = transfer_failure(TransferError::NotFound("raw/clip.mp4".into()), JobState::Downloading);
        assert_eq!(f.kind, FailureKind::NotFound);
        assert_eq!(f.step, JobState::Downloading);

        let f = transfer_failure(TransferError::Transient("503".into()), JobState::Uploading);
        assert_eq!(f.kind, FailureKind::Transient);
        assert!(f.message.contains("503"));
    }

    #[test]
    fn test_cleanup_guard_releases_only_when_armed() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(dir.path().join("raw"), dir.path().join("processed"));
        let job_id = JobId::new();
        let job_dir = dir.path().join("raw").join(job_id.to_string());

        std::fs::create_dir_all(&job_dir).unwrap();
        let mut guard = CleanupGuard::new(&staging, job_id);
        guard.disarm();
        drop(guard);
        assert!(job_dir.exists());

        drop(CleanupGuard::new(&staging, job_id));
        assert!(!job_dir.exists());
    }

    #[test]
    fn test_transcode_failure_kinds() {
        let f = transcode_failure(
            TranscodeError::new(TranscodeErrorKind::InvalidInput, "Invalid data found"),
            JobState::Transcoding,
        );
        assert_eq!(f.kind, FailureKind::Transcode);
        assert!(f.message.contains("Invalid data found"));

        let f = transcode_failure(
            TranscodeError::new(TranscodeErrorKind::LocalIo, "disk full"),
            JobState::Transcoding,
        );
        assert_eq!(f.kind, FailureKind::LocalIo);
    }
}
