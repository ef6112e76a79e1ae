use crate::{AuditLog, AuditRecord};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Fail-open front for [`AuditLog`] used by the safety paths.
///
/// An audit write failure must never block lockdown, flatten or nuclear
/// stop. Failures are logged at error level and counted instead.
#[derive(Clone)]
pub struct AuditRecorder {
    log: Arc<AuditLog>,
    failures: Arc<AtomicU64>,
}

impl AuditRecorder {
    pub fn new(log: Arc<AuditLog>) -> Self {
        Self {
            log,
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn record(&self, event_type: &str, payload: Value) -> Option<AuditRecord> {
        match self.log.append(event_type, payload) {
            Ok(rec) => {
                tracing::debug!(event = event_type, hash = %rec.hash_curr, "audit appended");
                Some(rec)
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(event = event_type, error = %format!("{e:#}"), "audit append failed");
                None
            }
        }
    }

    /// Number of audit writes that failed since start.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn log(&self) -> &Arc<AuditLog> {
        &self.log
    }
}
