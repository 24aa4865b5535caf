use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;
use crate::models::job::StagedRole;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub raw_staging: ComponentHealth,
    pub processed_staging: ComponentHealth,
    pub transcoder: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

impl ComponentHealth {
    fn from_result<E: std::fmt::Display>(result: Result<(), E>, start: std::time::Instant) -> Self {
        match result {
            Ok(()) => ComponentHealth {
                status: "ok".to_string(),
                latency_ms: Some(start.elapsed().as_millis() as u64),
                error: None,
            },
            Err(e) => ComponentHealth {
                status: "error".to_string(),
                latency_ms: None,
                error: Some(e.to_string()),
            },
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// GET /health — staging roots writable and transcoder available.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let staging = state.pipeline.staging();

    let start = std::time::Instant::now();
    let raw_staging = ComponentHealth::from_result(staging.check_writable(StagedRole::Raw).await, start);

    let start = std::time::Instant::now();
    let processed_staging =
        ComponentHealth::from_result(staging.check_writable(StagedRole::Processed).await, start);

    let start = std::time::Instant::now();
    let transcoder = ComponentHealth::from_result(state.engine.probe().await, start);

    let all_healthy = raw_staging.is_ok() && processed_staging.is_ok() && transcoder.is_ok();
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            raw_staging,
            processed_staging,
            transcoder,
        },
    };

    (status_code, Json(response))
}
