use crate::ExecutorMode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlatStatus {
    /// SHADOW mode: reported, venue untouched.
    Shadow,
    /// Not closed (DRY_RUN, or the venue refused).
    Skip,
    Closed,
}

/// Outcome for one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatResult {
    pub symbol: String,
    pub ticket: u64,
    pub status: FlatStatus,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// The venue could not be queried at all.
    Unavailable(String),
    Other(String),
}

impl std::fmt::Display for AdapterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterError::Unavailable(msg) => write!(f, "ADAPTER_UNAVAILABLE: {msg}"),
            AdapterError::Other(msg) => write!(f, "ADAPTER_ERROR: {msg}"),
        }
    }
}

impl std::error::Error for AdapterError {}

/// Broker-bridge contract as seen by the safety layer.
///
/// # Contract
/// `flat_all` must be safe to call in every execution mode and returns an
/// empty list when there are no positions.
#[async_trait]
pub trait TradingAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn mode(&self) -> ExecutorMode;

    async fn flat_all(&self, reason: &str) -> Result<Vec<FlatResult>, AdapterError>;
}

/// Holder for the optionally registered adapter.
///
/// Clones share the slot. An empty slot is a normal state at boot and the
/// safety paths audit a skip instead of failing.
#[derive(Clone, Default)]
pub struct AdapterSlot {
    inner: Arc<RwLock<Option<Arc<dyn TradingAdapter>>>>,
}

impl AdapterSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_adapter(adapter: Arc<dyn TradingAdapter>) -> Self {
        let slot = Self::new();
        slot.register(adapter);
        slot
    }

    pub fn register(&self, adapter: Arc<dyn TradingAdapter>) {
        let mut g = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *g = Some(adapter);
    }

    pub fn clear(&self) {
        let mut g = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *g = None;
    }

    pub fn get(&self) -> Option<Arc<dyn TradingAdapter>> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
