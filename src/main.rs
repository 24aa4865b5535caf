use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use video_processing_service::{
    app_state::AppState,
    config::AppConfig,
    routes,
    services::{storage::S3ObjectStore, transcode::FfmpegTranscoder},
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");
    let pipeline_config = config
        .pipeline_config()
        .expect("Invalid pipeline configuration");

    tracing::info!("Initializing video-processing-service");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe_metrics();

    tracing::info!(
        raw_bucket = %pipeline_config.raw_bucket,
        processed_bucket = %pipeline_config.processed_bucket,
        endpoint = %config.s3_endpoint,
        path_style = config.s3_path_style,
        "Initializing object storage client"
    );
    let mut store = S3ObjectStore::new(
        &[&pipeline_config.raw_bucket, &pipeline_config.processed_bucket],
        &config.s3_region,
        &config.s3_endpoint,
        &config.s3_access_key,
        &config.s3_secret_key,
    )
    .expect("Failed to initialize object storage client");
    if config.s3_path_style {
        store = store.with_path_style();
    }

    let engine = FfmpegTranscoder::new(config.ffmpeg_path.as_str());

    let state = AppState::new(
        Arc::new(store),
        Arc::new(engine),
        &pipeline_config,
        config.max_concurrent_jobs,
    );

    let app = routes::router(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(64 * 1024)); // job requests carry keys, not video

    tracing::info!("Starting video-processing-service on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!(
        max_concurrent_jobs = config.max_concurrent_jobs,
        "Server listening on {}",
        config.bind_addr
    );

    axum::serve(listener, app).await.expect("Server error");
}
