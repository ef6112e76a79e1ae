//! Request and response types for the wolfe-daemon HTTP endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable machine-readable code.
    pub error: String,
    pub detail: String,
}

// ---------------------------------------------------------------------------
// /ha/*
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaStatusResponse {
    pub node_id: String,
    pub running: bool,
    pub phase: String,
    pub is_leader: bool,
    pub fencing_token: Option<u64>,
    pub fencing_token_tail: Option<u64>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub last_heartbeat_age_ms: Option<i64>,
    pub lockdown_active: bool,
    pub lockdown: String,
    pub nuclear_active: bool,
    pub audit_failures: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    pub status: String,
    pub ack: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockdownClearResponse {
    pub status: String,
    pub previous: String,
}

// ---------------------------------------------------------------------------
// /nuclear/*
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngageResponse {
    pub status: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeRequest {
    pub signature_b64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeResponse {
    pub status: String,
    pub nonce: String,
}

// ---------------------------------------------------------------------------
// /audit/validate/{day}
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditValidateResponse {
    pub day: String,
    pub valid: bool,
    pub lines: Option<usize>,
    pub reason: Option<String>,
}
