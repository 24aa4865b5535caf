use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::job::{JobError, TransformOptions, DEFAULT_TARGET_HEIGHT};
use crate::models::object::{BucketName, ObjectNameError};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Bucket that receives uploaded source videos
    pub raw_bucket: String,

    /// Bucket that receives transcoded videos
    pub processed_bucket: String,

    /// S3-compatible endpoint URL
    pub s3_endpoint: String,

    #[serde(default = "default_region")]
    pub s3_region: String,

    /// S3 access key ID
    pub s3_access_key: String,

    /// S3 secret access key
    pub s3_secret_key: String,

    /// Use path-style bucket addressing (required by MinIO and most
    /// self-hosted endpoints)
    #[serde(default)]
    pub s3_path_style: bool,

    /// Local root for downloaded source videos
    #[serde(default = "default_raw_staging_dir")]
    pub raw_staging_dir: PathBuf,

    /// Local root for transcoded videos awaiting upload
    #[serde(default = "default_processed_staging_dir")]
    pub processed_staging_dir: PathBuf,

    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    #[serde(default = "default_target_height")]
    pub target_height: u32,

    /// Make uploaded renditions publicly readable
    #[serde(default = "default_true")]
    pub make_public: bool,

    #[serde(default = "default_transfer_timeout_secs")]
    pub download_timeout_secs: u64,

    #[serde(default = "default_transcode_timeout_secs")]
    pub transcode_timeout_secs: u64,

    #[serde(default = "default_transfer_timeout_secs")]
    pub upload_timeout_secs: u64,

    /// Attempts for the visibility step before it is reported as failed
    #[serde(default = "default_visibility_attempts")]
    pub visibility_attempts: u32,

    #[serde(default = "default_visibility_backoff_ms")]
    pub visibility_backoff_ms: u64,

    /// Upper bound on jobs processed at once by the HTTP server
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_region() -> String {
    "auto".to_string()
}

fn default_raw_staging_dir() -> PathBuf {
    PathBuf::from("./raw-videos")
}

fn default_processed_staging_dir() -> PathBuf {
    PathBuf::from("./processed-videos")
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_target_height() -> u32 {
    DEFAULT_TARGET_HEIGHT
}

fn default_true() -> bool {
    true
}

fn default_transfer_timeout_secs() -> u64 {
    300
}

fn default_transcode_timeout_secs() -> u64 {
    1800
}

fn default_visibility_attempts() -> u32 {
    3
}

fn default_visibility_backoff_ms() -> u64 {
    200
}

fn default_max_concurrent_jobs() -> usize {
    2
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Validate the raw settings into the typed configuration the pipeline
    /// components are built from.
    pub fn pipeline_config(&self) -> Result<PipelineConfig, ConfigError> {
        if self.raw_staging_dir == self.processed_staging_dir {
            return Err(ConfigError::SharedStagingRoot(self.raw_staging_dir.clone()));
        }
        if self.visibility_attempts == 0 {
            return Err(ConfigError::Invalid("visibility_attempts must be at least 1"));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(ConfigError::Invalid("max_concurrent_jobs must be at least 1"));
        }

        Ok(PipelineConfig {
            raw_bucket: BucketName::parse(self.raw_bucket.as_str())?,
            processed_bucket: BucketName::parse(self.processed_bucket.as_str())?,
            raw_staging_dir: self.raw_staging_dir.clone(),
            processed_staging_dir: self.processed_staging_dir.clone(),
            default_options: TransformOptions::new(self.target_height)?,
            make_public: self.make_public,
            timeouts: StepTimeouts {
                download: Duration::from_secs(self.download_timeout_secs),
                transcode: Duration::from_secs(self.transcode_timeout_secs),
                upload: Duration::from_secs(self.upload_timeout_secs),
            },
            visibility: VisibilityPolicy {
                attempts: self.visibility_attempts,
                initial_backoff: Duration::from_millis(self.visibility_backoff_ms),
            },
        })
    }
}

/// Typed pipeline settings passed to each component at construction.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub raw_bucket: BucketName,
    pub processed_bucket: BucketName,
    pub raw_staging_dir: PathBuf,
    pub processed_staging_dir: PathBuf,
    pub default_options: TransformOptions,
    pub make_public: bool,
    pub timeouts: StepTimeouts,
    pub visibility: VisibilityPolicy,
}

/// Deadline for each blocking pipeline step.
#[derive(Debug, Clone, Copy)]
pub struct StepTimeouts {
    pub download: Duration,
    pub transcode: Duration,
    pub upload: Duration,
}

/// Retry policy for making an uploaded object public.
#[derive(Debug, Clone, Copy)]
pub struct VisibilityPolicy {
    pub attempts: u32,
    pub initial_backoff: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Raw and processed staging roots must differ: {0}")]
    SharedStagingRoot(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),

    #[error(transparent)]
    Name(#[from] ObjectNameError),

    #[error(transparent)]
    Options(#[from] JobError),
}
