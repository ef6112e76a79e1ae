//! Lock-service contract used by leader election.
//!
//! The service must be strongly consistent and offer these primitives
//! atomically on the server side. Two backends exist: [`MemoryLockService`]
//! (single process, tests) and `wolfe_db::PgLockService` (shared Postgres).

pub mod ack;
mod memory;

pub use memory::MemoryLockService;

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Transient lock-service failure. Never fatal to the election loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The call did not complete within the per-operation budget.
    Timeout { op: &'static str, after_ms: u64 },
    /// The backend returned an error (connection, SQL, ...).
    Backend(String),
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockError::Timeout { op, after_ms } => {
                write!(f, "LOCK_TIMEOUT: {op} did not complete within {after_ms}ms")
            }
            LockError::Backend(msg) => write!(f, "LOCK_BACKEND: {msg}"),
        }
    }
}

impl std::error::Error for LockError {}

#[async_trait]
pub trait LockService: Send + Sync {
    /// Atomically increment a counter and return the new value (first call: 1).
    async fn incr(&self, key: &str) -> Result<u64, LockError>;

    /// Set `key = value` with a TTL only if the key is absent or expired.
    async fn set_nx_px(&self, key: &str, value: &str, ttl_ms: u64) -> Result<bool, LockError>;

    /// Extend the TTL only if the key currently holds `expected`.
    ///
    /// This is the heartbeat primitive: compare and extend in one step, so a
    /// takeover between a read and the extend cannot be missed.
    async fn extend_if_value(
        &self,
        key: &str,
        expected: &str,
        ttl_ms: u64,
    ) -> Result<bool, LockError>;

    async fn get(&self, key: &str) -> Result<Option<String>, LockError>;

    /// Delete the key only if it currently holds `expected`.
    async fn release_if_value(&self, key: &str, expected: &str) -> Result<bool, LockError>;

    async fn hset(&self, hash: &str, field: &str, value: &str) -> Result<(), LockError>;

    async fn hget(&self, hash: &str, field: &str) -> Result<Option<String>, LockError>;
}

/// Key names derived from the configured lock key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockKeys {
    pub lock: String,
    pub token: String,
}

impl LockKeys {
    pub fn new(lock_key: &str) -> Self {
        Self {
            lock: lock_key.to_string(),
            token: format!("{lock_key}:token"),
        }
    }
}

/// Run one lock-service call under a deadline. Elapsed deadline maps to
/// [`LockError::Timeout`].
pub async fn timed<T, F>(op: &'static str, budget: Duration, fut: F) -> Result<T, LockError>
where
    F: Future<Output = Result<T, LockError>>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(r) => r,
        Err(_) => {
            let after_ms = budget.as_millis() as u64;
            tracing::debug!(op, after_ms, "lock-service call timed out");
            Err(LockError::Timeout { op, after_ms })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_key_is_derived_from_lock_key() {
        let k = LockKeys::new("wolfe:ha:lock");
        assert_eq!(k.token, "wolfe:ha:lock:token");
    }

    #[tokio::test(start_paused = true)]
    async fn timed_maps_elapsed_deadline_to_timeout() {
        let r: Result<(), LockError> = timed("get", Duration::from_millis(500), async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(())
        })
        .await;
        assert_eq!(
            r,
            Err(LockError::Timeout {
                op: "get",
                after_ms: 500
            })
        );
    }
}
