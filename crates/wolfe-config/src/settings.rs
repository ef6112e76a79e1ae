use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Largest TTL accepted. Lock backends store it as a signed 64-bit interval.
pub const MAX_TTL_MS: u64 = 24 * 60 * 60 * 1000;

/// Typed settings. Every field has a default, so an empty config is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Identity written into the lease value. Must be unique per process.
    pub node_id: String,
    /// `LIVE`, `DRY_RUN` or `SHADOW` (`HONEYPOT`/`PAPER` alias SHADOW).
    pub executor_mode: String,
    pub ha: HaSettings,
    pub nuclear: NuclearSettings,
    pub audit: AuditSettings,
    pub daemon: DaemonSettings,
    pub lock: LockSettings,
}

impl Settings {
    /// Reject settings the control plane cannot run safely with.
    pub fn validate(&self) -> Result<()> {
        if self.node_id.trim().is_empty() {
            bail!("CONFIG_INVALID node_id must not be empty");
        }
        self.ha.validate()
    }
}

impl Default for Settings {
    fn default() -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self {
            node_id: format!("node-{}", &id[..8]),
            executor_mode: "SHADOW".to_string(),
            ha: HaSettings::default(),
            nuclear: NuclearSettings::default(),
            audit: AuditSettings::default(),
            daemon: DaemonSettings::default(),
            lock: LockSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HaSettings {
    pub lock_key: String,
    pub ttl_ms: u64,
    pub heartbeat_ms: u64,
    /// Upper bound for any single lock-service call.
    pub op_timeout_ms: u64,
    /// Split-brain flatten debounce window.
    pub flat_cooldown_ms: u64,
    pub auto_flat_on_lock_loss: bool,
}

impl HaSettings {
    /// All timings non-zero and one heartbeat plus one lock-service call
    /// strictly inside the TTL.
    pub fn validate(&self) -> Result<()> {
        if self.lock_key.trim().is_empty() {
            bail!("CONFIG_INVALID ha.lock_key must not be empty");
        }
        for (name, v) in [
            ("ttl_ms", self.ttl_ms),
            ("heartbeat_ms", self.heartbeat_ms),
            ("op_timeout_ms", self.op_timeout_ms),
        ] {
            if v == 0 {
                bail!("CONFIG_INVALID ha.{name} must be > 0");
            }
        }
        if self.ttl_ms > MAX_TTL_MS {
            bail!(
                "CONFIG_INVALID ha.ttl_ms={} exceeds {MAX_TTL_MS}",
                self.ttl_ms
            );
        }
        let renew = self.heartbeat_ms.saturating_add(self.op_timeout_ms);
        if renew >= self.ttl_ms {
            bail!(
                "CONFIG_INVALID ha.heartbeat_ms + ha.op_timeout_ms ({renew}) must be < ha.ttl_ms ({})",
                self.ttl_ms
            );
        }
        Ok(())
    }
}

impl Default for HaSettings {
    fn default() -> Self {
        Self {
            lock_key: "wolfe:ha:lock".to_string(),
            ttl_ms: 3000,
            heartbeat_ms: 1000,
            op_timeout_ms: 500,
            flat_cooldown_ms: 5000,
            auto_flat_on_lock_loss: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NuclearSettings {
    /// IANA zone used to derive the day nonce.
    pub timezone: String,
    /// Env var NAME holding the base64 Ed25519 public key.
    pub pubkey_env: String,
}

impl Default for NuclearSettings {
    fn default() -> Self {
        Self {
            timezone: "Europe/Prague".to_string(),
            pubkey_env: "WOLFE_NUCLEAR_PUBKEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    pub dir: String,
    /// Env var NAME holding the 32-byte audit key (base64 or hex).
    pub key_env: String,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            dir: "logs/audit".to_string(),
            key_env: "WOLFE_AUDIT_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    pub addr: String,
    /// Env var NAME holding the dashboard bearer token.
    pub token_env: String,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:9090".to_string(),
            token_env: "WOLFE_DASH_TOKEN".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    pub backend: LockBackend,
    /// Env var NAME holding the Postgres URL (postgres backend only).
    pub database_url_env: String,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            backend: LockBackend::Memory,
            database_url_env: "WOLFE_DATABASE_URL".to_string(),
        }
    }
}
