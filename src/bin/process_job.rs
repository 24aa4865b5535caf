//! Run a single job from the command line.
//!
//! Usage: `process-job <source_key> [target_key]`
//!
//! Exits 0 when the job reaches done, 1 when it fails and 2 on usage or
//! configuration errors.

use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use video_processing_service::{
    config::AppConfig,
    models::{job::Job, object::ObjectKey},
    services::{pipeline::Pipeline, storage::S3ObjectStore, transcode::FfmpegTranscoder},
};

const USAGE: &str = "usage: process-job <source_key> [target_key]";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            tracing::error!(error = %e, "Could not start job");
            eprintln!("{e}\n{USAGE}");
            ExitCode::from(2)
        }
    }
}

/// Returns whether the job reached done.
async fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let source_key = ObjectKey::parse(args.next().ok_or("missing source key")?)?;
    let target_key = args.next().map(ObjectKey::parse).transpose()?;
    if args.next().is_some() {
        return Err("too many arguments".into());
    }

    let config = AppConfig::from_env()?;
    let pipeline_config = config.pipeline_config()?;

    let mut store = S3ObjectStore::new(
        &[&pipeline_config.raw_bucket, &pipeline_config.processed_bucket],
        &config.s3_region,
        &config.s3_endpoint,
        &config.s3_access_key,
        &config.s3_secret_key,
    )?;
    if config.s3_path_style {
        store = store.with_path_style();
    }
    let engine = FfmpegTranscoder::new(config.ffmpeg_path.as_str());
    let pipeline = Pipeline::new(Arc::new(store), Arc::new(engine), &pipeline_config);

    let options = pipeline_config.default_options;
    let job = match target_key {
        Some(target) => Job::new(source_key, target, options, pipeline_config.make_public),
        None => Job::rendition_of(source_key, options, pipeline_config.make_public)?,
    };

    let report = pipeline.run(&job).await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(report.is_done())
}
