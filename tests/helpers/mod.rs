//! Test doubles for the storage and transcoding capabilities.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use video_processing_service::config::{PipelineConfig, StepTimeouts, VisibilityPolicy};
use video_processing_service::models::job::TransformOptions;
use video_processing_service::models::object::{BucketName, ObjectKey};
use video_processing_service::services::storage::{
    ObjectBody, ObjectSource, ObjectStore, StorageError,
};
use video_processing_service::services::transcode::{EngineError, Transcoder};

pub const RAW_BUCKET: &str = "raw-videos";
pub const PROCESSED_BUCKET: &str = "processed-videos";

/// Failure to inject into a storage operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    NotFound,
    PermissionDenied,
    Transient,
    /// A client error the backend will refuse again on resend.
    Rejected,
    /// Never completes; exercises step deadlines.
    Hang,
}

impl Fault {
    async fn raise(self, what: &str) -> StorageError {
        match self {
            Fault::NotFound => StorageError::NotFound(what.to_string()),
            Fault::PermissionDenied => StorageError::PermissionDenied(what.to_string()),
            Fault::Transient => StorageError::Transient(format!("{what}: 503 Slow Down")),
            Fault::Rejected => StorageError::Rejected(format!("{what}: status 400: InvalidArgument")),
            Fault::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                StorageError::Transient(what.to_string())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
    pub public: bool,
}

/// In-memory object store keyed by bucket and key.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<(String, String), StoredObject>>,
    get_fault: Mutex<Option<Fault>>,
    put_fault: Mutex<Option<Fault>>,
    /// Number of `set_public` calls that fail transiently before succeeding.
    set_public_failures: Mutex<u32>,
    /// Path whose existence is recorded each time `get` is called.
    watched: Mutex<Option<PathBuf>>,
    pub watched_existed_at_get: Mutex<Vec<bool>>,
    pub gets: AtomicUsize,
    pub puts: AtomicUsize,
    pub set_public_calls: AtomicUsize,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(self, bucket: &str, key: &str, data: &[u8]) -> Self {
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data: data.to_vec(),
                content_type: "video/mp4".to_string(),
                public: false,
            },
        );
        self
    }

    pub fn fail_get(self, fault: Fault) -> Self {
        *self.get_fault.lock().unwrap() = Some(fault);
        self
    }

    pub fn fail_put(self, fault: Fault) -> Self {
        *self.put_fault.lock().unwrap() = Some(fault);
        self
    }

    pub fn fail_set_public(self, times: u32) -> Self {
        *self.set_public_failures.lock().unwrap() = times;
        self
    }

    pub fn watch_during_get(self, path: impl Into<PathBuf>) -> Self {
        *self.watched.lock().unwrap() = Some(path.into());
        self
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn object_count(&self, bucket: &str) -> usize {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, _)| b == bucket)
            .count()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, bucket: &BucketName, key: &ObjectKey) -> Result<ObjectBody, StorageError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let watched = self.watched.lock().unwrap().clone();
        if let Some(path) = watched {
            self.watched_existed_at_get.lock().unwrap().push(path.exists());
        }
        let fault = *self.get_fault.lock().unwrap();
        if let Some(fault) = fault {
            return Err(fault.raise(&format!("{bucket}/{key}")).await);
        }
        let data = self
            .object(bucket.as_str(), key.as_str())
            .map(|o| o.data)
            .ok_or_else(|| StorageError::NotFound(format!("{bucket}/{key}")))?;
        // Small chunks so the body is streamed in several pieces.
        let chunks: Vec<Result<Bytes, StorageError>> = data
            .chunks(8)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        Ok(futures::stream::iter(chunks).boxed())
    }

    async fn put(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        source: ObjectSource<'_>,
        content_type: &str,
    ) -> Result<u64, StorageError> {
        use tokio::io::AsyncReadExt;

        self.puts.fetch_add(1, Ordering::SeqCst);
        let fault = *self.put_fault.lock().unwrap();
        if let Some(fault) = fault {
            return Err(fault.raise(&format!("{bucket}/{key}")).await);
        }
        let mut data = Vec::new();
        source
            .read_to_end(&mut data)
            .await
            .map_err(|e| StorageError::Transient(e.to_string()))?;
        let bytes = data.len() as u64;
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                public: false,
            },
        );
        Ok(bytes)
    }

    async fn set_public(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.set_public_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut remaining = self.set_public_failures.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StorageError::Transient(format!("{bucket}/{key}: ACL update throttled")));
            }
        }
        let mut objects = self.objects.lock().unwrap();
        match objects.get_mut(&(bucket.to_string(), key.to_string())) {
            Some(object) => {
                // Mirrors a metadata-replacing copy: the given type wins.
                object.public = true;
                object.content_type = content_type.to_string();
                Ok(())
            }
            None => Err(StorageError::NotFound(format!("{bucket}/{key}"))),
        }
    }
}

/// Behaviour of [`ScriptedTranscoder`].
#[derive(Debug, Clone)]
pub enum Script {
    /// Write `scaled:<height>:` followed by the input bytes.
    Succeed,
    /// Write a partial output file, then report the engine error.
    Fail(String),
    /// Never complete.
    Hang,
    /// Succeed like [`Script::Succeed`], after a delay.
    Slow(Duration),
}

pub struct ScriptedTranscoder {
    script: Script,
    pub runs: AtomicUsize,
    pub outputs: Mutex<Vec<PathBuf>>,
}

impl ScriptedTranscoder {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            runs: AtomicUsize::new(0),
            outputs: Mutex::new(Vec::new()),
        }
    }

    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcoder for ScriptedTranscoder {
    async fn run(
        &self,
        input: &Path,
        output: &Path,
        options: &TransformOptions,
    ) -> Result<(), EngineError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.outputs.lock().unwrap().push(output.to_path_buf());
        if let Script::Slow(delay) = &self.script {
            tokio::time::sleep(*delay).await;
        }
        match &self.script {
            Script::Succeed | Script::Slow(_) => {
                let input = tokio::fs::read(input)
                    .await
                    .map_err(|e| EngineError::Failed { message: e.to_string() })?;
                let mut data = format!("scaled:{}:", options.height).into_bytes();
                data.extend_from_slice(&input);
                tokio::fs::write(output, data)
                    .await
                    .map_err(|e| EngineError::Failed { message: e.to_string() })?;
                Ok(())
            }
            Script::Fail(message) => {
                let _ = tokio::fs::write(output, b"partial").await;
                Err(EngineError::Failed {
                    message: message.clone(),
                })
            }
            Script::Hang => {
                let _ = tokio::fs::write(output, b"partial").await;
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }
}

/// Pipeline configuration rooted in `dir`, with short deadlines.
pub fn test_config(dir: &Path) -> PipelineConfig {
    PipelineConfig {
        raw_bucket: BucketName::parse(RAW_BUCKET).unwrap(),
        processed_bucket: BucketName::parse(PROCESSED_BUCKET).unwrap(),
        raw_staging_dir: dir.join("raw-videos"),
        processed_staging_dir: dir.join("processed-videos"),
        default_options: TransformOptions::default(),
        make_public: true,
        timeouts: StepTimeouts {
            download: Duration::from_secs(5),
            transcode: Duration::from_secs(5),
            upload: Duration::from_secs(5),
        },
        visibility: VisibilityPolicy {
            attempts: 3,
            initial_backoff: Duration::from_millis(1),
        },
    }
}

/// Number of files and directories left under `root` (0 if it is missing).
pub fn entries_under(root: &Path) -> usize {
    match std::fs::read_dir(root) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .map(|entry| {
                let path = entry.path();
                1 + if path.is_dir() { entries_under(&path) } else { 0 }
            })
            .sum(),
        Err(_) => 0,
    }
}
