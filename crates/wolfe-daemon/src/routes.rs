//! Axum router and HTTP handlers for wolfe-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! CORS and tracing layers. Auth and the mode watermark are part of the
//! router so tests exercise them too.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use wolfe_audit::VerifyResult;
use wolfe_nuclear::{EngageOutcome, NuclearError};

use crate::{
    api_types::{
        AckResponse, AuditValidateResponse, EngageResponse, ErrorResponse, HaStatusResponse,
        HealthResponse, LockdownClearResponse, ResumeRequest, ResumeResponse,
    },
    middleware::{mode_watermark, require_bearer},
    state::{uptime_secs, AppState},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/ha/status", get(ha_status))
        .route("/ha/ack", post(ha_ack))
        .route("/ha/lockdown/clear", post(lockdown_clear))
        .route("/nuclear/engage", post(nuclear_engage))
        .route("/nuclear/resume", post(nuclear_resume))
        .route("/nuclear/status", get(nuclear_status))
        .route("/audit/validate/:day", get(audit_validate))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_bearer,
        ));

    Router::new()
        .route("/v1/health", get(health))
        .merge(protected)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            mode_watermark,
        ))
        .with_state(state)
}

fn error(status: StatusCode, code: &str, detail: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: code.to_string(),
            detail: detail.to_string(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        ok: true,
        service: st.build.service.to_string(),
        version: st.build.version.to_string(),
        node_id: st.node_id.clone(),
        uptime_secs: uptime_secs(),
    })
}

// ---------------------------------------------------------------------------
// GET /ha/status
// ---------------------------------------------------------------------------

pub(crate) async fn ha_status(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let s = st.elector.status();
    Json(HaStatusResponse {
        node_id: s.node_id,
        running: s.running,
        phase: format!("{:?}", s.phase).to_uppercase(),
        is_leader: s.is_leader,
        fencing_token: s.fencing_token,
        fencing_token_tail: s.fencing_token_tail,
        last_heartbeat_at: s.last_heartbeat_at,
        last_heartbeat_age_ms: s.last_heartbeat_age_ms,
        lockdown_active: s.lockdown_active,
        lockdown: s.lockdown.to_string(),
        nuclear_active: st.nuclear.is_active(),
        audit_failures: st.recorder.failures(),
    })
}

// ---------------------------------------------------------------------------
// POST /ha/ack
// ---------------------------------------------------------------------------

/// Human acknowledgement after a split-brain. Lets blocked nodes compete
/// again; does not clear lockdown.
pub(crate) async fn ha_ack(State(st): State<Arc<AppState>>) -> Response {
    match st.elector.acknowledge().await {
        Ok(ack) => Json(AckResponse {
            status: "ok".to_string(),
            ack,
        })
        .into_response(),
        Err(e) => error(StatusCode::SERVICE_UNAVAILABLE, "LockServiceUnavailable", e),
    }
}

// ---------------------------------------------------------------------------
// POST /ha/lockdown/clear
// ---------------------------------------------------------------------------

pub(crate) async fn lockdown_clear(State(st): State<Arc<AppState>>) -> Response {
    match st.elector.clear_lockdown(st.nuclear.is_active()) {
        Ok(prev) => Json(LockdownClearResponse {
            status: "cleared".to_string(),
            previous: prev.as_str().to_string(),
        })
        .into_response(),
        Err(e) => error(StatusCode::CONFLICT, "ClearRefused", e),
    }
}

// ---------------------------------------------------------------------------
// POST /nuclear/engage
// ---------------------------------------------------------------------------

pub(crate) async fn nuclear_engage(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let status = match st.nuclear.engage().await {
        EngageOutcome::Engaged(_) => "engaged",
        EngageOutcome::AlreadyActive => "already_active",
    };
    Json(EngageResponse {
        status: status.to_string(),
        active: true,
    })
}

// ---------------------------------------------------------------------------
// POST /nuclear/resume
// ---------------------------------------------------------------------------

pub(crate) async fn nuclear_resume(
    State(st): State<Arc<AppState>>,
    Json(body): Json<ResumeRequest>,
) -> Response {
    match st.nuclear.resume(&body.signature_b64) {
        Ok(nonce) => Json(ResumeResponse {
            status: "resumed".to_string(),
            nonce,
        })
        .into_response(),
        Err(e) => {
            let status = match e {
                NuclearError::NotActive => StatusCode::BAD_REQUEST,
                NuclearError::InvalidSignature => StatusCode::FORBIDDEN,
                NuclearError::ReplayRejected => StatusCode::CONFLICT,
            };
            error(status, e.code(), &e)
        }
    }
}

// ---------------------------------------------------------------------------
// GET /nuclear/status
// ---------------------------------------------------------------------------

pub(crate) async fn nuclear_status(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    Json(st.nuclear.status())
}

// ---------------------------------------------------------------------------
// GET /audit/validate/:day
// ---------------------------------------------------------------------------

pub(crate) async fn audit_validate(
    State(st): State<Arc<AppState>>,
    Path(day): Path<String>,
) -> Response {
    let Ok(date) = NaiveDate::parse_from_str(&day, "%Y-%m-%d") else {
        return error(StatusCode::BAD_REQUEST, "BadDay", "expected YYYY-MM-DD");
    };

    let log = Arc::clone(st.recorder.log());
    let res = tokio::task::spawn_blocking(move || log.validate_day(date)).await;

    let verdict = match res {
        Ok(Ok(v)) => v,
        Ok(Err(e)) => return error(StatusCode::INTERNAL_SERVER_ERROR, "AuditReadFailed", format!("{e:#}")),
        Err(e) => return error(StatusCode::INTERNAL_SERVER_ERROR, "AuditReadFailed", e),
    };

    let (valid, lines, reason) = match verdict {
        VerifyResult::Valid { lines } => (true, Some(lines), None),
        VerifyResult::Broken { line, reason } => {
            (false, Some(line), Some(format!("line {line}: {reason}")))
        }
        VerifyResult::Missing => (false, None, Some("no audit file for day".to_string())),
    };

    Json(AuditValidateResponse {
        day,
        valid,
        lines,
        reason,
    })
    .into_response()
}
