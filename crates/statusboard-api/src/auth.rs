//! Bearer-token gate for the admin routes.

use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::ApiState;
use crate::handlers::error_response;

pub async fn require_bearer(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if token_matches(token, &state.admin_token) => next.run(request).await,
        Some(_) => {
            warn!(path = %request.uri().path(), "rejected admin request with wrong token");
            error_response("invalid token", StatusCode::UNAUTHORIZED).into_response()
        }
        None => error_response("missing bearer token", StatusCode::UNAUTHORIZED).into_response(),
    }
}

/// Compare without short-circuiting on the first differing byte.
fn token_matches(presented: &str, expected: &str) -> bool {
    let (a, b) = (presented.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
