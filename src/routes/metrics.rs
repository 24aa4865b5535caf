use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Register descriptions for the pipeline's metrics.
pub fn describe_metrics() {
    metrics::describe_counter!("video_jobs_total", "Total video jobs started");
    metrics::describe_counter!("video_jobs_completed", "Video jobs that reached done");
    metrics::describe_counter!(
        "video_jobs_failed",
        "Video jobs that reached failed, labelled by failure kind"
    );
    metrics::describe_histogram!(
        "video_step_seconds",
        metrics::Unit::Seconds,
        "Duration of each pipeline step"
    );
    metrics::describe_counter!(
        "video_jobs_cancelled",
        "Video jobs dropped before their cleanup step"
    );
    metrics::describe_counter!(
        "video_visibility_failures",
        "Uploads whose public-read step gave up"
    );
}

/// Prometheus metrics scrape endpoint.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
