//! REST API handlers.
//!
//! Status and metrics read the controller's published snapshot and never
//! wait on a running cycle. Everything that needs the inventory itself
//! answers 409 while a cycle holds it.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::{info, warn};

use botfleet_core::HostIndex;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

// ── Cycle ──────────────────────────────────────────────────────

/// POST /api/v1/cycle
pub async fn trigger_cycle(State(state): State<ApiState>) -> impl IntoResponse {
    match state.controller.trigger() {
        Ok(_) => {
            info!("manual cycle triggered");
            (
                StatusCode::ACCEPTED,
                ApiResponse::ok(serde_json::json!({ "status": "cycle started" })),
            )
                .into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::CONFLICT).into_response(),
    }
}

// ── Fleet ──────────────────────────────────────────────────────

/// GET /api/v1/status
pub async fn get_status(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.controller.status())
}

/// GET /api/v1/workers
pub async fn list_workers(State(state): State<ApiState>) -> impl IntoResponse {
    match state.controller.workers() {
        Ok(listing) => ApiResponse::ok(listing).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::CONFLICT).into_response(),
    }
}

// ── Hosts ──────────────────────────────────────────────────────

/// GET /api/v1/hosts/:index
pub async fn get_host(
    State(state): State<ApiState>,
    Path(index): Path<HostIndex>,
) -> impl IntoResponse {
    let gateway = state.controller.gateway();
    if index >= gateway.host_count() {
        return error_response("host not found", StatusCode::NOT_FOUND).into_response();
    }
    match gateway.host_status(index).await {
        Ok(doc) => ApiResponse::ok(doc).into_response(),
        Err(e) => {
            warn!(host = index, error = %e, "host status query failed");
            error_response(&e.to_string(), StatusCode::BAD_GATEWAY).into_response()
        }
    }
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let body = crate::prometheus::render_prometheus(&state.controller.status());
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
