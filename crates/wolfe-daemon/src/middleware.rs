//! Bearer-token auth and the execution-mode watermark header.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use sha2::{Digest, Sha256};

use crate::{api_types::ErrorResponse, state::AppState};

pub const MODE_HEADER: &str = "x-wolfe-mode";

/// Reject requests without `Authorization: Bearer <token>` matching the
/// configured dashboard token. No configured token rejects everything.
pub async fn require_bearer(
    State(st): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let presented = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    let ok = match (st.dash_token.as_deref(), presented) {
        (Some(expected), Some(got)) => digest(expected) == digest(got),
        _ => false,
    };

    if !ok {
        tracing::warn!(path = %req.uri().path(), "unauthorized request");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Unauthorized".to_string(),
                detail: "missing or invalid bearer token".to_string(),
            }),
        )
            .into_response();
    }
    next.run(req).await
}

/// Stamp every response with the execution mode.
pub async fn mode_watermark(
    State(st): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let mut resp = next.run(req).await;
    resp.headers_mut()
        .insert(MODE_HEADER, HeaderValue::from_static(st.mode.as_str()));
    resp
}

// Fixed-length digests keep the comparison independent of token length.
fn digest(s: &str) -> [u8; 32] {
    Sha256::digest(s.as_bytes()).into()
}
