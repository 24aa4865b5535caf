use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use super::object::{ObjectKey, ObjectNameError};

pub const DEFAULT_TARGET_HEIGHT: u32 = 360;
const MAX_TARGET_HEIGHT: u32 = 4320;

/// Identity of one unit of work. Staged paths are derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// How the staged raw file is transformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformOptions {
    /// Output height in pixels; width follows the source aspect ratio.
    pub height: u32,
}

impl TransformOptions {
    pub fn new(height: u32) -> Result<Self, JobError> {
        // Encoders reject odd dimensions.
        if height < 2 || height > MAX_TARGET_HEIGHT || height % 2 != 0 {
            return Err(JobError::InvalidHeight(height));
        }
        Ok(Self { height })
    }
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            height: DEFAULT_TARGET_HEIGHT,
        }
    }
}

/// A request to move and rescale one video object end to end.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    id: JobId,
    source_key: ObjectKey,
    target_key: ObjectKey,
    options: TransformOptions,
    make_public: bool,
}

impl Job {
    pub fn new(
        source_key: ObjectKey,
        target_key: ObjectKey,
        options: TransformOptions,
        make_public: bool,
    ) -> Self {
        Self {
            id: JobId::new(),
            source_key,
            target_key,
            options,
            make_public,
        }
    }

    /// Job whose target is the source key renamed for the output height.
    pub fn rendition_of(
        source_key: ObjectKey,
        options: TransformOptions,
        make_public: bool,
    ) -> Result<Self, ObjectNameError> {
        let target_key = source_key.rendition(options.height)?;
        Ok(Self::new(source_key, target_key, options, make_public))
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn source_key(&self) -> &ObjectKey {
        &self.source_key
    }

    pub fn target_key(&self) -> &ObjectKey {
        &self.target_key
    }

    pub fn options(&self) -> &TransformOptions {
        &self.options
    }

    pub fn make_public(&self) -> bool {
        self.make_public
    }
}

/// Which staging root a file lives under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StagedRole {
    Raw,
    Processed,
}

/// A job-scoped local copy of video data. Only the staging area hands these out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub job_id: JobId,
    pub role: StagedRole,
    pub path: PathBuf,
}

/// Lifecycle of a job inside the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobState {
    Pending,
    Downloading,
    Transcoding,
    Uploading,
    CleaningUp,
    Done,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

/// Failure taxonomy surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    PermissionDenied,
    Transient,
    Transcode,
    LocalIo,
}

impl FailureKind {
    /// Whether re-submitting the same job may succeed.
    pub fn is_retryable(self) -> bool {
        matches!(self, FailureKind::Transient)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    /// State the job was in when the failure happened.
    pub step: JobState,
    pub message: String,
}

/// Outcome of the visibility step, tracked apart from the upload itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Visibility {
    Skipped,
    Public,
    Failed { attempts: u32, reason: String },
}

/// Terminal report for one job.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: JobId,
    pub source_key: ObjectKey,
    pub target_key: ObjectKey,
    pub state: JobState,
    pub transitions: Vec<JobState>,
    pub failure: Option<JobFailure>,
    pub visibility: Option<Visibility>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobReport {
    pub fn is_done(&self) -> bool {
        self.state == JobState::Done
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure.as_ref().map(|f| f.kind)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Target height must be an even number between 2 and 4320, got {0}")]
    InvalidHeight(u32),
}
