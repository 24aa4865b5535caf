use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::PipelineConfig;
use crate::models::job::TransformOptions;
use crate::services::{pipeline::Pipeline, storage::ObjectStore, transcode::Transcoder};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub engine: Arc<dyn Transcoder>,
    /// Bounds how many jobs run at once.
    pub job_slots: Arc<Semaphore>,
    pub default_options: TransformOptions,
    pub make_public: bool,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        engine: Arc<dyn Transcoder>,
        config: &PipelineConfig,
        max_concurrent_jobs: usize,
    ) -> Self {
        Self {
            pipeline: Arc::new(Pipeline::new(store, engine.clone(), config)),
            engine,
            job_slots: Arc::new(Semaphore::new(max_concurrent_jobs)),
            default_options: config.default_options,
            make_public: config.make_public,
        }
    }
}
