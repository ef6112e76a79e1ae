use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use wolfe_execution::{
    AdapterError, ExecutorMode, FlatResult, FlatStatus, Lockdown, LockdownState, TradingAdapter,
};

/// One observed `flat_all` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatCall {
    pub reason: String,
    /// Lockdown state at the moment the call arrived.
    pub lockdown: LockdownState,
}

/// Adapter double that records every `flat_all` and can be told to fail.
pub struct RecordingAdapter {
    lockdown: Lockdown,
    calls: Mutex<Vec<FlatCall>>,
    fail: AtomicBool,
}

impl RecordingAdapter {
    pub fn new(lockdown: Lockdown) -> Self {
        Self {
            lockdown,
            calls: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> Vec<FlatCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Make subsequent `flat_all` calls return `Unavailable`.
    pub fn set_failing(&self, on: bool) {
        self.fail.store(on, Ordering::SeqCst);
    }
}

#[async_trait]
impl TradingAdapter for RecordingAdapter {
    fn name(&self) -> &str {
        "recording"
    }

    fn mode(&self) -> ExecutorMode {
        ExecutorMode::Shadow
    }

    async fn flat_all(&self, reason: &str) -> Result<Vec<FlatResult>, AdapterError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(FlatCall {
                reason: reason.to_string(),
                lockdown: self.lockdown.state(),
            });
        if self.fail.load(Ordering::SeqCst) {
            return Err(AdapterError::Unavailable("bridge down".to_string()));
        }
        Ok(vec![FlatResult {
            symbol: "EURUSD".to_string(),
            ticket: 1,
            status: FlatStatus::Shadow,
            reason: reason.to_string(),
        }])
    }
}
