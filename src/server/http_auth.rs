use super::state::AppState;
use axum::{
    extract::{Request, State},
    http::{header, header::HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use sha2::{Digest, Sha256};
use tracing::warn;

pub(super) fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

/// Compares digests so the check does not short-circuit on the first differing byte.
pub(super) fn is_admin_authorized(headers: &HeaderMap, expected_token: &str) -> bool {
    if expected_token.is_empty() {
        return false;
    }
    match extract_bearer_token(headers) {
        Some(token) => Sha256::digest(token.as_bytes()) == Sha256::digest(expected_token.as_bytes()),
        None => false,
    }
}

/// Guards every `/api/admin` route.
pub(super) async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !is_admin_authorized(request.headers(), &state.admin_token) {
        warn!(path = %request.uri().path(), "Rejected admin request");
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "Missing or invalid admin token"})),
        )
            .into_response();
    }
    next.run(request).await
}
