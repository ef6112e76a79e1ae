//! Runtime secret resolution.
//!
//! Config stores env var NAMES (`daemon.token_env`, `audit.key_env`, ...).
//! [`resolve_secrets`] is called once at startup and the result is passed to
//! constructors. Error messages name the variable, never the value, and
//! `Debug` redacts every value.

use crate::{LockBackend, Settings};
use anyhow::{bail, Result};

#[derive(Clone, Default)]
pub struct ResolvedSecrets {
    /// Bearer token for the daemon's operator endpoints.
    pub dash_token: Option<String>,
    /// 32-byte audit key, base64 or hex.
    pub audit_key: Option<String>,
    /// Base64 Ed25519 verifying key for nuclear resume.
    pub nuclear_pubkey: Option<String>,
    /// Postgres URL for the shared lock service.
    pub database_url: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("dash_token", &self.dash_token.as_ref().map(|_| "<REDACTED>"))
            .field("audit_key", &self.audit_key.as_ref().map(|_| "<REDACTED>"))
            .field(
                "nuclear_pubkey",
                &self.nuclear_pubkey.as_ref().map(|_| "<REDACTED>"),
            )
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

/// Resolve secrets from the process environment.
pub fn resolve_secrets(settings: &Settings) -> Result<ResolvedSecrets> {
    resolve_secrets_with(settings, |name| std::env::var(name).ok())
}

/// Resolve secrets through `lookup` (env var name -> value).
///
/// LIVE mode requires the dashboard token and the audit key. The postgres
/// backend requires the database URL in every mode.
pub fn resolve_secrets_with<F>(settings: &Settings, lookup: F) -> Result<ResolvedSecrets>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    let out = ResolvedSecrets {
        dash_token: get(&settings.daemon.token_env),
        audit_key: get(&settings.audit.key_env),
        nuclear_pubkey: get(&settings.nuclear.pubkey_env),
        database_url: get(&settings.lock.database_url_env),
    };

    if settings.executor_mode.eq_ignore_ascii_case("LIVE") {
        if out.dash_token.is_none() {
            bail!(
                "SECRET_MISSING: {} must be set in LIVE mode",
                settings.daemon.token_env
            );
        }
        if out.audit_key.is_none() {
            bail!(
                "SECRET_MISSING: {} must be set in LIVE mode",
                settings.audit.key_env
            );
        }
    }
    if settings.lock.backend == LockBackend::Postgres && out.database_url.is_none() {
        bail!(
            "SECRET_MISSING: {} must be set for the postgres lock backend",
            settings.lock.database_url_env
        );
    }

    Ok(out)
}
