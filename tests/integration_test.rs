use futures::TryStreamExt;
use std::sync::Arc;
use video_processing_service::{
    config::AppConfig,
    models::job::{Job, JobState, TransformOptions, Visibility},
    models::object::ObjectKey,
    services::{
        pipeline::Pipeline,
        storage::{ObjectStore, S3ObjectStore, StorageError},
        transcode::{FfmpegTranscoder, Transcoder},
    },
};
use uuid::Uuid;

/// Integration test: full pipeline against real infrastructure
///
/// This test verifies:
/// 1. Upload of a generated source video to the raw bucket
/// 2. Download, rescale with ffmpeg, upload to the processed bucket
/// 3. Visibility set on the rendition
/// 4. Local staging left empty
///
/// Note: This requires an S3-compatible endpoint and an ffmpeg binary,
/// configured via environment variables.
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_full_integration() {
    let config = AppConfig::from_env().expect("Failed to load config");
    let pipeline_config = config.pipeline_config().expect("Invalid config");

    let mut store = S3ObjectStore::new(
        &[&pipeline_config.raw_bucket, &pipeline_config.processed_bucket],
        &config.s3_region,
        &config.s3_endpoint,
        &config.s3_access_key,
        &config.s3_secret_key,
    )
    .expect("Failed to initialize storage");
    if config.s3_path_style {
        store = store.with_path_style();
    }
    let store = Arc::new(store);
    let engine = Arc::new(FfmpegTranscoder::new(config.ffmpeg_path.as_str()));
    engine.probe().await.expect("ffmpeg not available");

    // Generate a one second test pattern to use as the source video
    let scratch = tempfile::tempdir().expect("Failed to create temp dir");
    let source_path = scratch.path().join("source.mp4");
    let status = tokio::process::Command::new(&config.ffmpeg_path)
        .args(["-hide_banner", "-y", "-f", "lavfi", "-i"])
        .arg("testsrc=duration=1:size=640x480:rate=10")
        .arg(&source_path)
        .status()
        .await
        .expect("Failed to run ffmpeg");
    assert!(status.success());
    let mut source = tokio::fs::File::open(&source_path).await.unwrap();

    let run_id = Uuid::new_v4();
    let source_key = ObjectKey::parse(format!("test/{run_id}.mp4")).unwrap();
    store
        .put(&pipeline_config.raw_bucket, &source_key, &mut source, "video/mp4")
        .await
        .expect("Source upload failed");

    let pipeline = Pipeline::new(store.clone(), engine, &pipeline_config);
    let job = Job::rendition_of(source_key.clone(), TransformOptions::new(240).unwrap(), true)
        .unwrap();
    let report = pipeline.run(&job).await;

    assert_eq!(report.state, JobState::Done, "job failed: {:?}", report.failure);
    assert!(matches!(
        report.visibility,
        Some(Visibility::Public) | Some(Visibility::Failed { .. })
    ));

    let rendition: Vec<_> = store
        .get(&pipeline_config.processed_bucket, job.target_key())
        .await
        .expect("Rendition missing")
        .try_collect()
        .await
        .expect("Rendition body failed");
    assert!(rendition.iter().map(|chunk| chunk.len()).sum::<usize>() > 0);

    let missing = ObjectKey::parse(format!("test/{run_id}-missing.mp4")).unwrap();
    let result = store.get(&pipeline_config.raw_bucket, &missing).await;
    assert!(matches!(result, Err(StorageError::NotFound(_))));

    assert!(!pipeline_config.raw_staging_dir.join(job.id().to_string()).exists());
    assert!(!pipeline_config
        .processed_staging_dir
        .join(job.id().to_string())
        .exists());
}
