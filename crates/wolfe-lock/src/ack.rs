//! Human acknowledgement flag that lifts the post-loss block.
//!
//! Stored in the shared lock service so that an ack written through any
//! node's endpoint is visible to every node.

use crate::{LockError, LockService};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

pub const ACK_HASH: &str = "ha:ack";
pub const ACK_FIELD: &str = "split_brain_ack";

/// Write the ack timestamp and return the stored string.
pub async fn write_ack(svc: &dyn LockService, at: DateTime<Utc>) -> Result<String, LockError> {
    let iso = at.to_rfc3339_opts(SecondsFormat::Millis, true);
    svc.hset(ACK_HASH, ACK_FIELD, &iso).await?;
    Ok(iso)
}

pub async fn read_ack(svc: &dyn LockService) -> Result<Option<String>, LockError> {
    svc.hget(ACK_HASH, ACK_FIELD).await
}

/// Parse an ack timestamp. Accepts RFC 3339 and offset-less ISO 8601 (UTC).
pub fn parse_ack(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|n| n.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_rfc3339_and_naive_iso() {
        let want = Utc.with_ymd_and_hms(2026, 3, 2, 10, 15, 0).unwrap();
        assert_eq!(parse_ack("2026-03-02T10:15:00Z"), Some(want));
        assert_eq!(parse_ack("2026-03-02T11:15:00+01:00"), Some(want));
        assert_eq!(parse_ack("2026-03-02T10:15:00.000"), Some(want));
        assert_eq!(parse_ack("yesterday"), None);
    }
}
