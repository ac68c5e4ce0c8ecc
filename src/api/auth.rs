// src/api/auth.rs — Optional bearer-token guard

use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;

use super::types::ErrorResponse;
use super::{ApiFailure, ApiState};

/// Token from an `Authorization: Bearer <token>` header. The scheme name
/// is matched case-insensitively.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
}

/// Pass when no token is configured or the presented one matches.
pub fn check_auth(state: &ApiState, headers: &HeaderMap) -> Result<(), ApiFailure> {
    let Some(expected) = state.token.as_deref() else {
        return Ok(());
    };

    let presented = bearer_token(headers).unwrap_or("");
    if tokens_match(presented.as_bytes(), expected.as_bytes()) {
        return Ok(());
    }

    tracing::warn!(present = !presented.is_empty(), "Rejected layout request: bad bearer token");
    Err((
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::new("Invalid or missing bearer token", "UNAUTHORIZED")),
    ))
}

/// Compare without short-circuiting on the first differing byte.
fn tokens_match(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
