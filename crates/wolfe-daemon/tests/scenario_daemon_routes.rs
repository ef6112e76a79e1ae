//! In-process scenario tests for wolfe-daemon HTTP endpoints.
//!
//! The router is driven via `tower::ServiceExt::oneshot`; no socket is bound.
//!
//! # Invariants under test
//! - Health is public; every other route needs the bearer token (401).
//! - No configured token means every protected route is refused.
//! - Every response carries `X-Wolfe-Mode`.
//! - Nuclear resume maps NotActive/InvalidSignature/ReplayRejected to
//!   400/403/409 and a valid signature to 200.
//! - Lockdown clear is refused (409) while nuclear is active.
//! - Ack is written to the shared lock service.
//! - Audit validation reports today's chain as valid.
//! - Assembly fails on HA timings the elector cannot run with.

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use chrono::Utc;
use http_body_util::BodyExt;
use tower::ServiceExt; // oneshot
use wolfe_audit::{AuditKey, AuditLog};
use wolfe_config::{ResolvedSecrets, Settings};
use wolfe_daemon::{routes, state::AppState};
use wolfe_execution::{AdapterSlot, LockdownState};
use wolfe_lock::ack::read_ack;
use wolfe_lock::MemoryLockService;
use wolfe_nuclear::{
    day_nonce, generate_signing_key, parse_timezone, sign_day_nonce, verifying_key_b64,
};

const TOKEN: &str = "test-dash-token";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Harness {
    state: Arc<AppState>,
    svc: Arc<MemoryLockService>,
    key: ed25519_dalek::SigningKey,
    _dir: tempfile::TempDir,
}

fn harness_with_token(token: Option<&str>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let audit = Arc::new(AuditLog::open(dir.path(), &AuditKey::generate()).unwrap());
    let svc = Arc::new(MemoryLockService::new());
    let key = generate_signing_key();

    let settings = Settings {
        node_id: "node-a".to_string(),
        executor_mode: "SHADOW".to_string(),
        ..Settings::default()
    };
    let secrets = ResolvedSecrets {
        dash_token: token.map(str::to_string),
        nuclear_pubkey: Some(verifying_key_b64(&key)),
        ..ResolvedSecrets::default()
    };

    let state = AppState::assemble(&settings, &secrets, svc.clone(), audit, AdapterSlot::new())
        .expect("assemble");
    Harness {
        state: Arc::new(state),
        svc,
        key,
        _dir: dir,
    }
}

fn harness() -> Harness {
    harness_with_token(Some(TOKEN))
}

fn req(method: &str, uri: &str, token: Option<&str>, body: Option<serde_json::Value>) -> Request<axum::body::Body> {
    let mut b = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        b = b.header("authorization", format!("Bearer {t}"));
    }
    match body {
        Some(v) => b
            .header("content-type", "application/json")
            .body(axum::body::Body::from(v.to_string()))
            .unwrap(),
        None => b.body(axum::body::Body::empty()).unwrap(),
    }
}

/// Drive the router with a single request and return (status, mode header, json).
async fn call(
    h: &Harness,
    req: Request<axum::body::Body>,
) -> (StatusCode, Option<String>, serde_json::Value) {
    let router = routes::build_router(Arc::clone(&h.state));
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let mode = resp
        .headers()
        .get("x-wolfe-mode")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).expect("body is not valid JSON")
    };
    (status, mode, json)
}

fn today_signature(h: &Harness) -> String {
    let tz = parse_timezone("Europe/Prague").unwrap();
    sign_day_nonce(&h.key, &day_nonce(Utc::now(), tz))
}

// ---------------------------------------------------------------------------
// Auth + watermark
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_is_public_and_watermarked() {
    let h = harness();
    let (status, mode, json) = call(&h, req("GET", "/v1/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mode.as_deref(), Some("SHADOW"));
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "wolfe-daemon");
    assert_eq!(json["node_id"], "node-a");
}

#[tokio::test]
async fn protected_routes_require_bearer_token() {
    let h = harness();
    for (method, uri) in [
        ("GET", "/ha/status"),
        ("POST", "/ha/ack"),
        ("POST", "/ha/lockdown/clear"),
        ("POST", "/nuclear/engage"),
        ("GET", "/nuclear/status"),
        ("GET", "/audit/validate/2026-03-02"),
    ] {
        let (status, mode, _) = call(&h, req(method, uri, None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri} without token");
        assert_eq!(mode.as_deref(), Some("SHADOW"), "401 must be watermarked too");

        let (status, _, _) = call(&h, req(method, uri, Some("wrong"), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri} wrong token");
    }
    assert!(!h.state.nuclear.is_active(), "refused engage must not run");
}

#[tokio::test]
async fn missing_configured_token_refuses_everything() {
    let h = harness_with_token(None);
    let (status, _, _) = call(&h, req("GET", "/ha/status", Some(""), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// /ha/*
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ha_status_reports_follower_at_boot() {
    let h = harness();
    let (status, _, json) = call(&h, req("GET", "/ha/status", Some(TOKEN), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["node_id"], "node-a");
    assert_eq!(json["phase"], "FOLLOWER");
    assert_eq!(json["is_leader"], false);
    assert_eq!(json["running"], false);
    assert_eq!(json["lockdown_active"], false);
    assert_eq!(json["nuclear_active"], false);
    assert_eq!(json["audit_failures"], 0);
    assert!(json["fencing_token_tail"].is_null());
}

#[tokio::test]
async fn ack_is_written_to_lock_service() {
    let h = harness();
    let (status, _, json) = call(&h, req("POST", "/ha/ack", Some(TOKEN), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    let stored = read_ack(h.svc.as_ref()).await.unwrap();
    assert_eq!(stored.as_deref(), json["ack"].as_str());
}

#[tokio::test]
async fn lockdown_clear_refused_while_nuclear_active() {
    let h = harness();
    let (status, _, _) = call(&h, req("POST", "/nuclear/engage", Some(TOKEN), None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, json) =
        call(&h, req("POST", "/ha/lockdown/clear", Some(TOKEN), None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "ClearRefused");
    assert_eq!(h.state.lockdown.state(), LockdownState::SplitBrain);
}

#[tokio::test]
async fn lockdown_clear_succeeds_when_unblocked() {
    let h = harness();
    h.state.lockdown.set(LockdownState::SplitBrain);
    let (status, _, json) =
        call(&h, req("POST", "/ha/lockdown/clear", Some(TOKEN), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["previous"], "SPLIT_BRAIN");
    assert_eq!(h.state.lockdown.state(), LockdownState::None);
}

// ---------------------------------------------------------------------------
// /nuclear/*
// ---------------------------------------------------------------------------

#[tokio::test]
async fn nuclear_resume_status_codes() {
    let h = harness();
    let sig = today_signature(&h);
    let body = || Some(serde_json::json!({ "signature_b64": sig }));

    let (status, _, json) = call(&h, req("POST", "/nuclear/resume", Some(TOKEN), body())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "NotActive");

    let (status, _, json) = call(&h, req("POST", "/nuclear/engage", Some(TOKEN), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "engaged");

    let bad = Some(serde_json::json!({ "signature_b64": "AAAA" }));
    let (status, _, json) = call(&h, req("POST", "/nuclear/resume", Some(TOKEN), bad)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "InvalidSignature");

    let (status, _, json) = call(&h, req("POST", "/nuclear/resume", Some(TOKEN), body())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "resumed");
    assert_eq!(h.state.lockdown.state(), LockdownState::None);

    call(&h, req("POST", "/nuclear/engage", Some(TOKEN), None)).await;
    let (status, _, json) = call(&h, req("POST", "/nuclear/resume", Some(TOKEN), body())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "ReplayRejected");

    let (status, _, json) = call(&h, req("GET", "/nuclear/status", Some(TOKEN), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["active"], true);
    assert_eq!(json["last_nonce_used"], json["nonce_today"]);
}

// ---------------------------------------------------------------------------
// /audit/validate/:day
// ---------------------------------------------------------------------------

#[tokio::test]
async fn audit_validate_reports_chain() {
    let h = harness();
    call(&h, req("POST", "/nuclear/engage", Some(TOKEN), None)).await;

    let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
    let (status, _, json) = call(
        &h,
        req("GET", &format!("/audit/validate/{today}"), Some(TOKEN), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["valid"], true);
    assert!(json["lines"].as_u64().unwrap() >= 2);

    let (status, _, json) =
        call(&h, req("GET", "/audit/validate/1999-01-01", Some(TOKEN), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["valid"], false);

    let (status, _, _) = call(&h, req("GET", "/audit/validate/yesterday", Some(TOKEN), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn assemble_refuses_unusable_ha_timings() {
    let dir = tempfile::tempdir().unwrap();
    let audit = Arc::new(AuditLog::open(dir.path(), &AuditKey::generate()).unwrap());
    let mut settings = Settings {
        node_id: "node-a".to_string(),
        ..Settings::default()
    };
    settings.ha.heartbeat_ms = 0;

    let err = AppState::assemble(
        &settings,
        &ResolvedSecrets::default(),
        Arc::new(MemoryLockService::new()),
        audit,
        AdapterSlot::new(),
    )
    .err()
    .expect("zero heartbeat must not assemble");
    assert!(format!("{err}").contains("heartbeat_ms"), "got: {err}");
}
