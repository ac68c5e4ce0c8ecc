// src/api/handlers.rs

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use super::types::*;
use super::{auth, ApiFailure, ApiState};
use crate::infra::errors::{CopilotError, ErrorKind};

const BUSY_RETRY_SECS: u64 = 30;
const UPSTREAM_RETRY_SECS: u64 = 10;

/// Map a pipeline error to a status and body. Internal detail stays in
/// the log; clients see the error's own message only for input and budget
/// problems.
pub fn error_response(err: &CopilotError) -> ApiFailure {
    let (status, body) = match err.kind() {
        ErrorKind::UnsupportedInput => {
            let code = match err {
                CopilotError::UnsupportedCity { .. } => "UNSUPPORTED_CITY",
                _ => "INVALID_REQUEST",
            };
            (StatusCode::BAD_REQUEST, ErrorResponse::new(err.to_string(), code))
        }
        ErrorKind::BudgetExceeded => (
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorResponse::new(
                "No compliant layout found within the iteration budget",
                "BUDGET_EXCEEDED",
            )
            .with_retry_after(BUSY_RETRY_SECS),
        ),
        ErrorKind::Timeout => (
            StatusCode::GATEWAY_TIMEOUT,
            ErrorResponse::new("Layout generation timed out", "TIMEOUT")
                .with_retry_after(BUSY_RETRY_SECS),
        ),
        ErrorKind::TransientRemote => {
            let retry = match err {
                CopilotError::RateLimited { retry_after_ms, .. } => retry_after_ms.div_ceil(1000).max(1),
                _ => UPSTREAM_RETRY_SECS,
            };
            (
                StatusCode::BAD_GATEWAY,
                ErrorResponse::new("Model or retrieval service unavailable", "UPSTREAM_UNAVAILABLE")
                    .with_retry_after(retry),
            )
        }
        ErrorKind::Internal => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::new("Internal error", "INTERNAL_ERROR"),
        ),
    };

    if status.is_server_error() {
        tracing::error!(error = %err, code = %body.error_code, "Layout request failed");
    } else {
        tracing::info!(error = %err, code = %body.error_code, "Layout request rejected");
    }
    (status, Json(body))
}

/// POST /api/v1/layouts — Run the full pipeline for one store.
pub async fn generate_layout(
    State(state): State<ApiState>,
    headers: HeaderMap,
    payload: Result<Json<LayoutRequest>, JsonRejection>,
) -> Result<Json<LayoutResponse>, ApiFailure> {
    auth::check_auth(&state, &headers)?;

    let Json(request) = payload.map_err(|rejection| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(rejection.body_text(), "INVALID_REQUEST")),
        )
    })?;

    let job = request.to_job().map_err(|e| error_response(&e))?;
    let outcome = state
        .pipeline
        .run(job)
        .await
        .map_err(|e| error_response(&e))?;

    Ok(Json(LayoutResponse::from_outcome(outcome, &request)))
}

/// GET /api/v1/health — Liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "layout-copilot",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
