use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;

use crate::models::job::{Job, StagedFile, StagedRole, TransformOptions};
use crate::services::staging::StagingArea;

/// Lines of engine stderr kept in error messages.
const STDERR_TAIL_LINES: usize = 8;

/// Transcoding capability. Resolves only once the engine signals completion.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn run(
        &self,
        input: &Path,
        output: &Path,
        options: &TransformOptions,
    ) -> Result<(), EngineError>;

    /// Check the engine is usable without running a job.
    async fn probe(&self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Transcoder backed by an `ffmpeg` binary.
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    fn command(&self, input: &Path, output: &Path, options: &TransformOptions) -> Command {
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.arg("-hide_banner")
            .arg("-nostdin")
            .arg("-y")
            .arg("-i")
            .arg(input)
            // -2 keeps the width even while preserving aspect ratio.
            .arg("-vf")
            .arg(format!("scale=-2:{}", options.height))
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn run(
        &self,
        input: &Path,
        output: &Path,
        options: &TransformOptions,
    ) -> Result<(), EngineError> {
        let result = self
            .command(input, output, options)
            .output()
            .await
            .map_err(|e| EngineError::Unavailable(format!("{}: {e}", self.ffmpeg_path)))?;

        tracing::trace!(status = %result.status, "ffmpeg finished");

        if result.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&result.stderr);
        let message = match stderr_tail(&stderr) {
            tail if tail.is_empty() => format!("ffmpeg exited with {}", result.status),
            tail => tail,
        };
        Err(EngineError::Failed { message })
    }

    async fn probe(&self) -> Result<(), EngineError> {
        let status = Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| EngineError::Unavailable(format!("{}: {e}", self.ffmpeg_path)))?;
        if status.success() {
            Ok(())
        } else {
            Err(EngineError::Failed {
                message: format!("{} -version exited with {status}", self.ffmpeg_path),
            })
        }
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Rescales staged raw files into staged processed files.
pub struct TranscodeService {
    engine: Arc<dyn Transcoder>,
    staging: StagingArea,
    deadline: Duration,
}

impl TranscodeService {
    pub fn new(engine: Arc<dyn Transcoder>, staging: StagingArea, deadline: Duration) -> Self {
        Self {
            engine,
            staging,
            deadline,
        }
    }

    /// Transform `raw` into the job's processed staged file. On failure the
    /// processed path is released before the error is returned.
    pub async fn transform(&self, job: &Job, raw: &StagedFile) -> Result<StagedFile, TranscodeError> {
        let output = self
            .staging
            .acquire_path(job, StagedRole::Processed)
            .await
            .map_err(|e| TranscodeError::new(TranscodeErrorKind::LocalIo, e.to_string()))?;

        let start = Instant::now();
        let result = match tokio::time::timeout(
            self.deadline,
            self.engine.run(&raw.path, &output, job.options()),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TranscodeError::from(e)),
            Err(_) => Err(TranscodeError::new(
                TranscodeErrorKind::TimedOut,
                format!("transcode did not finish within {}s", self.deadline.as_secs_f64()),
            )),
        };

        if let Err(e) = result {
            tracing::error!(job_id = %job.id(), kind = %e.kind, reason = %e.reason, "Transcode failed");
            self.staging.release(job.id(), StagedRole::Processed).await;
            return Err(e);
        }

        // The engine reported success; make sure it actually wrote something.
        match tokio::fs::metadata(&output).await {
            Ok(meta) if meta.len() > 0 => {}
            _ => {
                self.staging.release(job.id(), StagedRole::Processed).await;
                return Err(TranscodeError::new(
                    TranscodeErrorKind::EngineCrashed,
                    format!("engine reported success but {} is empty", output.display()),
                ));
            }
        }

        tracing::info!(
            job_id = %job.id(),
            height = job.options().height,
            path = %output.display(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Transcode complete"
        );

        Ok(StagedFile {
            job_id: job.id(),
            role: StagedRole::Processed,
            path: output,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Transcoder could not be started: {0}")]
    Unavailable(String),

    #[error("Transcoder failed: {message}")]
    Failed { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum TranscodeErrorKind {
    InvalidInput,
    UnsupportedFormat,
    EngineCrashed,
    TimedOut,
    LocalIo,
}

#[derive(Debug, thiserror::Error)]
#[error("Transcode error ({kind}): {reason}")]
pub struct TranscodeError {
    pub kind: TranscodeErrorKind,
    pub reason: String,
}

impl TranscodeError {
    pub fn new(kind: TranscodeErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

impl From<EngineError> for TranscodeError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Unavailable(reason) => {
                TranscodeError::new(TranscodeErrorKind::EngineCrashed, reason)
            }
            EngineError::Failed { message } => {
                TranscodeError::new(classify_diagnostic(&message), message)
            }
        }
    }
}

/// Map an engine diagnostic to a failure kind.
pub fn classify_diagnostic(message: &str) -> TranscodeErrorKind {
    let lower = message.to_ascii_lowercase();
    if lower.contains("invalid data found") || lower.contains("moov atom not found") {
        TranscodeErrorKind::InvalidInput
    } else if lower.contains("unknown format")
        || lower.contains("not supported")
        || lower.contains("unsupported codec")
    {
        TranscodeErrorKind::UnsupportedFormat
    } else {
        TranscodeErrorKind::EngineCrashed
    }
}
