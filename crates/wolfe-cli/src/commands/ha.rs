use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use wolfe_audit::{events, AuditLog};
use wolfe_lock::ack::{read_ack, write_ack};
use wolfe_lock::{LockKeys, LockService};

/// Open the audit log an ack should be recorded in, if one was given.
pub fn ack_audit_log(audit_dir: Option<&str>, key_env: &str) -> Result<Option<AuditLog>> {
    let Some(dir) = audit_dir else {
        return Ok(None);
    };
    let key = super::audit_key_from_env(key_env)?;
    let log = AuditLog::open(dir, &key).with_context(|| format!("cannot open audit dir {dir}"))?;
    Ok(Some(log))
}

/// Same effect as `POST /ha/ack` on any node, without going through a daemon.
///
/// The ack is recorded as HA_HUMAN_ACK when `audit` is given; otherwise the
/// operator is told it was not audited.
pub async fn ack(svc: &dyn LockService, audit: Option<&AuditLog>) -> Result<String> {
    let ack = write_ack(svc, Utc::now()).await?;
    tracing::info!(%ack, "split-brain ack written");
    println!("ack={ack}");

    match audit {
        Some(log) => {
            log.append(events::HA_HUMAN_ACK, json!({ "node": "cli", "ack": ack }))
                .context("ack written but audit append failed")?;
            println!("audited=true");
        }
        None => {
            eprintln!("notice: ack not audited; pass --audit-dir to record HA_HUMAN_ACK");
            println!("audited=false");
        }
    }
    Ok(ack)
}

pub async fn inspect(svc: &dyn LockService, lock_key: &str) -> Result<()> {
    let keys = LockKeys::new(lock_key);
    let holder = svc.get(&keys.lock).await?;
    let ack = read_ack(svc).await?;
    println!("lock_key={}", keys.lock);
    println!("holder={}", holder.as_deref().unwrap_or("NONE"));
    println!("ack={}", ack.as_deref().unwrap_or("NONE"));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wolfe_audit::AuditKey;
    use wolfe_lock::MemoryLockService;

    #[tokio::test]
    async fn ack_is_recorded_in_the_audit_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path(), &AuditKey::generate()).unwrap();
        let svc = MemoryLockService::new();

        let written = ack(&svc, Some(&log)).await.unwrap();
        assert_eq!(read_ack(&svc).await.unwrap().as_deref(), Some(written.as_str()));

        let recs = log.read_day(Utc::now().date_naive()).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].event_type, events::HA_HUMAN_ACK);
        assert_eq!(recs[0].payload["ack"], written.as_str());
        assert_eq!(recs[0].payload["node"], "cli");
    }

    #[tokio::test]
    async fn ack_without_audit_dir_still_writes_the_flag() {
        let svc = MemoryLockService::new();
        let written = ack(&svc, None).await.unwrap();
        assert_eq!(read_ack(&svc).await.unwrap(), Some(written));
        assert!(ack_audit_log(None, "UNUSED").unwrap().is_none());
    }
}
