//! Cryptographic emergency stop.
//!
//! `engage` needs no credentials and works on any node, leader or not: it
//! locks down and flattens. `resume` requires an Ed25519 signature, made
//! offline, over the current day nonce (`YYYY-MM-DD` in the configured
//! timezone). Each day nonce can resume at most once.

mod keys;

pub use keys::{
    generate_signing_key, parse_signing_key, parse_verifying_key, sign_day_nonce, signing_key_b64,
    verifying_key_b64,
};

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use ed25519_dalek::{Signature, VerifyingKey};
use serde::Serialize;
use serde_json::json;
use std::sync::Mutex;
use wolfe_audit::{events, AuditRecorder};
use wolfe_config::NuclearSettings;
use wolfe_execution::{EmergencyFlatten, FlattenOutcome, FlattenTrigger, Lockdown, LockdownState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NuclearError {
    NotActive,
    /// The day nonce was already used (or is older than the last one used).
    ReplayRejected,
    /// Bad base64, bad signature, wrong key or no key configured.
    InvalidSignature,
}

impl NuclearError {
    pub fn code(&self) -> &'static str {
        match self {
            NuclearError::NotActive => "NotActive",
            NuclearError::ReplayRejected => "ReplayRejected",
            NuclearError::InvalidSignature => "InvalidSignature",
        }
    }
}

impl std::fmt::Display for NuclearError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NuclearError::NotActive => write!(f, "NUCLEAR_NOT_ACTIVE: nothing to resume"),
            NuclearError::ReplayRejected => {
                write!(f, "NUCLEAR_REPLAY_REJECTED: day nonce already consumed")
            }
            NuclearError::InvalidSignature => {
                write!(f, "NUCLEAR_INVALID_SIGNATURE: signature does not verify")
            }
        }
    }
}

impl std::error::Error for NuclearError {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NuclearState {
    pub active: bool,
    pub last_nonce_used: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NuclearStatus {
    pub active: bool,
    pub last_nonce_used: Option<String>,
    pub nonce_today: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngageOutcome {
    AlreadyActive,
    Engaged(FlattenOutcome),
}

/// Day nonce for `now` in `tz`.
pub fn day_nonce(now: DateTime<Utc>, tz: Tz) -> String {
    now.with_timezone(&tz).format("%Y-%m-%d").to_string()
}

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|e| anyhow!("invalid timezone {name:?}: {e}"))
}

pub struct NuclearControl {
    tz: Tz,
    pubkey: Option<VerifyingKey>,
    lockdown: Lockdown,
    flatten: EmergencyFlatten,
    recorder: AuditRecorder,
    state: Mutex<NuclearState>,
}

impl NuclearControl {
    pub fn new(
        tz: Tz,
        pubkey: Option<VerifyingKey>,
        lockdown: Lockdown,
        flatten: EmergencyFlatten,
        recorder: AuditRecorder,
    ) -> Self {
        if pubkey.is_none() {
            tracing::warn!("no nuclear public key configured; resume will always be rejected");
        }
        Self {
            tz,
            pubkey,
            lockdown,
            flatten,
            recorder,
            state: Mutex::new(NuclearState::default()),
        }
    }

    /// Build from settings and the resolved base64 public key.
    ///
    /// A malformed key is logged and treated as absent, so engage still works.
    pub fn from_settings(
        settings: &NuclearSettings,
        pubkey_b64: Option<&str>,
        lockdown: Lockdown,
        flatten: EmergencyFlatten,
        recorder: AuditRecorder,
    ) -> Result<Self> {
        let tz = parse_timezone(&settings.timezone)?;
        let pubkey = match pubkey_b64.map(parse_verifying_key) {
            Some(Ok(k)) => Some(k),
            Some(Err(e)) => {
                tracing::error!(env = %settings.pubkey_env, error = %e, "nuclear public key unusable");
                None
            }
            None => None,
        };
        Ok(Self::new(tz, pubkey, lockdown, flatten, recorder))
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, NuclearState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_active(&self) -> bool {
        self.guard().active
    }

    pub fn status(&self) -> NuclearStatus {
        let nonce_today = day_nonce(Utc::now(), self.tz);
        let s = self.guard();
        NuclearStatus {
            active: s.active,
            last_nonce_used: s.last_nonce_used.clone(),
            nonce_today,
        }
    }

    /// Engage the stop. Idempotent while active.
    pub async fn engage(&self) -> EngageOutcome {
        {
            let mut s = self.guard();
            if s.active {
                return EngageOutcome::AlreadyActive;
            }
            s.active = true;
        }
        self.lockdown.set(LockdownState::SplitBrain);
        tracing::error!("NUCLEAR stop engaged");

        let outcome = self.flatten.execute(FlattenTrigger::Nuclear).await;
        self.recorder.record(events::NUCLEAR_LOCKED, json!({}));
        EngageOutcome::Engaged(outcome)
    }

    pub fn resume(&self, signature_b64: &str) -> Result<String, NuclearError> {
        self.resume_at(signature_b64, Utc::now())
    }

    /// Resume with an explicit clock reading. Returns the consumed nonce.
    pub fn resume_at(&self, signature_b64: &str, now: DateTime<Utc>) -> Result<String, NuclearError> {
        let nonce = day_nonce(now, self.tz);
        let mut s = self.guard();

        let checked = self.check(&s, &nonce, signature_b64);
        if let Err(e) = checked {
            drop(s);
            tracing::warn!(nonce = %nonce, reason = e.code(), "nuclear resume rejected");
            self.recorder.record(
                events::NUCLEAR_RESUME_REJECTED,
                json!({ "nonce": nonce, "reason": e.code() }),
            );
            return Err(e);
        }

        s.active = false;
        s.last_nonce_used = Some(nonce.clone());
        self.lockdown.set(LockdownState::None);
        drop(s);

        tracing::warn!(nonce = %nonce, "NUCLEAR stop resumed");
        self.recorder
            .record(events::NUCLEAR_RESUMED, json!({ "nonce": nonce }));
        Ok(nonce)
    }

    fn check(&self, s: &NuclearState, nonce: &str, signature_b64: &str) -> Result<(), NuclearError> {
        if !s.active {
            return Err(NuclearError::NotActive);
        }
        // ISO dates order lexicographically, so this also refuses a nonce
        // from before the last one used (clock moved backwards).
        if s
            .last_nonce_used
            .as_deref()
            .is_some_and(|last| nonce <= last)
        {
            return Err(NuclearError::ReplayRejected);
        }
        let key = self.pubkey.as_ref().ok_or(NuclearError::InvalidSignature)?;
        let raw = B64
            .decode(signature_b64.trim())
            .map_err(|_| NuclearError::InvalidSignature)?;
        let sig = Signature::from_slice(&raw).map_err(|_| NuclearError::InvalidSignature)?;
        key.verify_strict(nonce.as_bytes(), &sig)
            .map_err(|_| NuclearError::InvalidSignature)
    }
}
