use axum::{routing::get, routing::post, Router};

use crate::app_state::AppState;

pub mod health;
pub mod jobs;
pub mod metrics;

/// Application routes sharing [`AppState`]. The Prometheus endpoint is added
/// by the server binary because it carries its own state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/process-video", post(jobs::process_video))
        .route("/api/v1/jobs", post(jobs::submit_job))
        .with_state(state)
}
