//! REST API handlers.
//!
//! Each handler calls one `CommandSurface` operation and returns JSON.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;

use statusboard_engine::CommandError;

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

pub(crate) fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn status_for(e: &CommandError) -> StatusCode {
    match e {
        CommandError::InvalidInterval(_) => StatusCode::BAD_REQUEST,
        CommandError::AlreadyExists(_) => StatusCode::CONFLICT,
        CommandError::NotFound(_) => StatusCode::NOT_FOUND,
        CommandError::Unreachable(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CommandError::Platform(_) | CommandError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Internal failures were already logged by the command surface.
fn command_error(e: &CommandError) -> axum::response::Response {
    error_response(&e.public_message(), status_for(e)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct CreateParams {
    pub interval: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct IntervalRequest {
    pub minutes: u32,
}

/// GET /healthz
pub async fn healthz() -> &'static str {
    "ok"
}

// ── Trackers ───────────────────────────────────────────────────

/// GET /api/v1/trackers
pub async fn list_trackers(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.commands.list())
}

/// POST /api/v1/trackers/{dest}
pub async fn create_tracker(
    State(state): State<ApiState>,
    Path(dest): Path<String>,
    Query(params): Query<CreateParams>,
) -> impl IntoResponse {
    match state.commands.create(&dest, params.interval).await {
        Ok(outcome) => (StatusCode::CREATED, ApiResponse::ok(outcome)).into_response(),
        Err(e) => command_error(&e),
    }
}

/// DELETE /api/v1/trackers/{dest}
pub async fn delete_tracker(
    State(state): State<ApiState>,
    Path(dest): Path<String>,
) -> impl IntoResponse {
    match state.commands.delete(&dest).await {
        Ok(outcome) => ApiResponse::ok(outcome).into_response(),
        Err(e) => command_error(&e),
    }
}

/// PUT /api/v1/trackers/{dest}/interval
pub async fn set_interval(
    State(state): State<ApiState>,
    Path(dest): Path<String>,
    Json(req): Json<IntervalRequest>,
) -> impl IntoResponse {
    match state.commands.set_interval(&dest, req.minutes) {
        Ok(()) => ApiResponse::ok(serde_json::json!({
            "destination": dest,
            "refresh_interval": req.minutes,
        }))
        .into_response(),
        Err(e) => command_error(&e),
    }
}

// ── Settings ───────────────────────────────────────────────────

/// PUT /api/v1/settings/default-interval
pub async fn set_default_interval(
    State(state): State<ApiState>,
    Json(req): Json<IntervalRequest>,
) -> impl IntoResponse {
    match state.commands.set_default_interval(req.minutes) {
        Ok(()) => ApiResponse::ok(serde_json::json!({
            "default_refresh_interval": req.minutes,
        }))
        .into_response(),
        Err(e) => command_error(&e),
    }
}

// ── Reconciliation ─────────────────────────────────────────────

/// POST /api/v1/refresh
pub async fn refresh(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.commands.refresh().await)
}

/// POST /api/v1/sync
pub async fn sync(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.commands.sync().await)
}

/// GET /api/v1/debug
pub async fn debug(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.commands.debug())
}
