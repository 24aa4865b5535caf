use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::models::job::{FailureKind, Job, JobReport, TransformOptions};
use crate::models::object::ObjectKey;
use crate::models::request::{PubSubPushRequest, SubmitJobRequest};

type JobResponse = Result<(StatusCode, Json<JobReport>), (StatusCode, String)>;

/// POST /process-video — storage upload notification pushed by Pub/Sub.
pub async fn process_video(
    State(state): State<AppState>,
    body: Result<Json<PubSubPushRequest>, JsonRejection>,
) -> JobResponse {
    let Json(request) = body.map_err(bad_request)?;
    request.validate().map_err(bad_request)?;

    let notification = request.notification().map_err(bad_request)?;
    let source_key = ObjectKey::parse(notification.name).map_err(bad_request)?;

    tracing::info!(
        message_id = request.message.message_id.as_deref().unwrap_or("-"),
        source_key = %source_key,
        "Received upload notification"
    );

    let job = Job::rendition_of(source_key, state.default_options, state.make_public)
        .map_err(bad_request)?;
    run_job(&state, job).await
}

/// POST /api/v1/jobs — submit a job with explicit keys and options.
pub async fn submit_job(
    State(state): State<AppState>,
    body: Result<Json<SubmitJobRequest>, JsonRejection>,
) -> JobResponse {
    let Json(request) = body.map_err(bad_request)?;
    request.validate().map_err(bad_request)?;

    let source_key = ObjectKey::parse(request.source_key).map_err(bad_request)?;
    let options = match request.height {
        Some(height) => TransformOptions::new(height).map_err(bad_request)?,
        None => state.default_options,
    };
    let make_public = request.make_public.unwrap_or(state.make_public);

    let job = match request.target_key {
        Some(target) => Job::new(
            source_key,
            ObjectKey::parse(target).map_err(bad_request)?,
            options,
            make_public,
        ),
        None => Job::rendition_of(source_key, options, make_public).map_err(bad_request)?,
    };
    run_job(&state, job).await
}

async fn run_job(state: &AppState, job: Job) -> JobResponse {
    let permit = state.job_slots.clone().acquire_owned().await.map_err(|_| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "Job slots are closed".to_string(),
        )
    })?;

    // Detached from the request: a dropped connection must not cut the job
    // short, and the slot stays taken until the job ends.
    let pipeline = state.pipeline.clone();
    let job_id = job.id();
    let task = tokio::spawn(async move {
        let _permit = permit;
        pipeline.run(&job).await
    });

    let report = task.await.map_err(|e| {
        tracing::error!(job_id = %job_id, error = %e, "Job task ended abnormally");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Job task ended abnormally".to_string(),
        )
    })?;
    Ok((status_for(&report), Json(report)))
}

/// HTTP status for a finished job. Only transient failures map to a status
/// that asks the sender to redeliver later.
pub fn status_for(report: &JobReport) -> StatusCode {
    match report.failure_kind() {
        None => StatusCode::OK,
        Some(FailureKind::NotFound) => StatusCode::NOT_FOUND,
        Some(FailureKind::PermissionDenied) => StatusCode::FORBIDDEN,
        Some(FailureKind::Transcode) => StatusCode::UNPROCESSABLE_ENTITY,
        Some(FailureKind::Transient) => StatusCode::SERVICE_UNAVAILABLE,
        Some(FailureKind::LocalIo) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn bad_request(err: impl std::fmt::Display) -> (StatusCode, String) {
    tracing::warn!(error = %err, "Rejected job request");
    (StatusCode::BAD_REQUEST, err.to_string())
}
