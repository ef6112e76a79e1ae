use crate::{LockError, LockService};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Default)]
struct Inner {
    kv: HashMap<String, Entry>,
    counters: HashMap<String, u64>,
    hashes: HashMap<String, HashMap<String, String>>,
    fail_next: u32,
    latency: Option<Duration>,
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map(|t| now < t).unwrap_or(true)
    }
}

/// In-process lock service.
///
/// Shares the semantics of the Postgres backend; two electors holding the
/// same `Arc<MemoryLockService>` contend exactly like two nodes on one
/// shared store. Expiry uses `tokio::time::Instant`, so paused-clock tests
/// can drive TTLs deterministically.
///
/// The `force_set`, `expire`, `fail_next` and `set_latency` methods are
/// fault-injection hooks for scenarios.
#[derive(Default)]
pub struct MemoryLockService {
    inner: Mutex<Inner>,
}

impl MemoryLockService {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, LockError> {
        self.inner
            .lock()
            .map_err(|_| LockError::Backend("memory store poisoned".to_string()))
    }

    async fn enter(&self) -> Result<MutexGuard<'_, Inner>, LockError> {
        let latency = {
            let mut g = self.lock()?;
            if g.fail_next > 0 {
                g.fail_next -= 1;
                return Err(LockError::Backend("injected failure".to_string()));
            }
            g.latency
        };
        if let Some(d) = latency {
            tokio::time::sleep(d).await;
        }
        self.lock()
    }

    /// Overwrite a key regardless of its holder (simulates a takeover).
    pub fn force_set(&self, key: &str, value: &str, ttl_ms: u64) {
        if let Ok(mut g) = self.lock() {
            g.kv.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: Some(Instant::now() + Duration::from_millis(ttl_ms)),
                },
            );
        }
    }

    /// Drop a key as if its TTL elapsed.
    pub fn expire(&self, key: &str) {
        if let Ok(mut g) = self.lock() {
            g.kv.remove(key);
        }
    }

    /// Make the next `n` calls fail with a backend error.
    pub fn fail_next(&self, n: u32) {
        if let Ok(mut g) = self.lock() {
            g.fail_next = n;
        }
    }

    /// Delay every call by `latency` (None disables).
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut g) = self.lock() {
            g.latency = latency;
        }
    }

    /// Current counter value without incrementing.
    pub fn counter(&self, key: &str) -> u64 {
        self.lock()
            .map(|g| g.counters.get(key).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

#[async_trait]
impl LockService for MemoryLockService {
    async fn incr(&self, key: &str) -> Result<u64, LockError> {
        let mut g = self.enter().await?;
        let c = g.counters.entry(key.to_string()).or_insert(0);
        *c += 1;
        Ok(*c)
    }

    async fn set_nx_px(&self, key: &str, value: &str, ttl_ms: u64) -> Result<bool, LockError> {
        let mut g = self.enter().await?;
        let now = Instant::now();
        if g.kv.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        g.kv.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(now + Duration::from_millis(ttl_ms)),
            },
        );
        Ok(true)
    }

    async fn extend_if_value(
        &self,
        key: &str,
        expected: &str,
        ttl_ms: u64,
    ) -> Result<bool, LockError> {
        let mut g = self.enter().await?;
        let now = Instant::now();
        match g.kv.get_mut(key) {
            Some(e) if e.is_live(now) && e.value == expected => {
                e.expires_at = Some(now + Duration::from_millis(ttl_ms));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LockError> {
        let g = self.enter().await?;
        let now = Instant::now();
        Ok(g
            .kv
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn release_if_value(&self, key: &str, expected: &str) -> Result<bool, LockError> {
        let mut g = self.enter().await?;
        let now = Instant::now();
        let ours = g
            .kv
            .get(key)
            .is_some_and(|e| e.is_live(now) && e.value == expected);
        if ours {
            g.kv.remove(key);
        }
        Ok(ours)
    }

    async fn hset(&self, hash: &str, field: &str, value: &str) -> Result<(), LockError> {
        let mut g = self.enter().await?;
        g.hashes
            .entry(hash.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hget(&self, hash: &str, field: &str) -> Result<Option<String>, LockError> {
        let g = self.enter().await?;
        Ok(g.hashes.get(hash).and_then(|h| h.get(field)).cloned())
    }
}
