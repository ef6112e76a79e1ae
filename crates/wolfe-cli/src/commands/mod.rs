//! Command handler modules for wolfe-cli.
//!
//! Shared utilities used by multiple command paths live here.

pub mod audit;
pub mod ha;
pub mod nuclear;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use wolfe_audit::AuditKey;

pub const DEFAULT_AUDIT_KEY_ENV: &str = "WOLFE_AUDIT_KEY";

/// Parse a `--day` argument (YYYY-MM-DD).
pub fn parse_day(day: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(day.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid --day '{day}', expected YYYY-MM-DD"))
}

/// The nonce for `day`, or today's nonce in `tz` when no day is given.
pub fn nonce_for(tz: &str, day: Option<&str>) -> Result<String> {
    match day {
        Some(d) => Ok(parse_day(d)?.format("%Y-%m-%d").to_string()),
        None => {
            let tz = wolfe_nuclear::parse_timezone(tz)?;
            Ok(wolfe_nuclear::day_nonce(Utc::now(), tz))
        }
    }
}

pub fn audit_key_from_env(key_env: &str) -> Result<AuditKey> {
    let raw = std::env::var(key_env).with_context(|| format!("missing env var {key_env}"))?;
    AuditKey::parse(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_day_is_normalized() {
        assert_eq!(nonce_for("Europe/Prague", Some(" 2026-03-02 ")).unwrap(), "2026-03-02");
    }

    #[test]
    fn bad_day_and_bad_tz_are_rejected() {
        assert!(nonce_for("Europe/Prague", Some("02.03.2026")).is_err());
        assert!(nonce_for("Mars/Olympus", None).is_err());
    }
}
