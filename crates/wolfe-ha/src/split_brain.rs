use serde_json::json;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use wolfe_audit::{events, AuditRecorder};
use wolfe_config::HaSettings;
use wolfe_execution::{EmergencyFlatten, FlattenOutcome, FlattenTrigger, Lockdown, LockdownState};

#[derive(Debug, Clone)]
pub struct SplitBrainConfig {
    /// Minimum spacing between two eligible triggers.
    pub cooldown: Duration,
    /// When false, loss is audited but nothing is flattened or locked.
    pub auto_flat: bool,
}

impl SplitBrainConfig {
    pub fn from_settings(ha: &HaSettings) -> Self {
        Self {
            cooldown: Duration::from_millis(ha.flat_cooldown_ms),
            auto_flat: ha.auto_flat_on_lock_loss,
        }
    }
}

impl Default for SplitBrainConfig {
    fn default() -> Self {
        Self::from_settings(&HaSettings::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LossOutcome {
    /// Lockdown was already SPLIT_BRAIN; nothing done.
    AlreadyLocked,
    /// Inside the cooldown of a previous trigger; nothing done.
    Debounced,
    /// Auto-flatten is switched off; skip audited.
    Disabled,
    /// Lockdown engaged and flatten attempted.
    Flattened(FlattenOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearRefused {
    /// The elector still waits for a human ack.
    ElectorBlocked,
    /// The nuclear stop is engaged; only a signed resume may clear.
    NuclearActive,
}

impl std::fmt::Display for ClearRefused {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClearRefused::ElectorBlocked => {
                write!(f, "CLEAR_REFUSED: elector blocked pending human ack")
            }
            ClearRefused::NuclearActive => {
                write!(f, "CLEAR_REFUSED: nuclear stop is active")
            }
        }
    }
}

impl std::error::Error for ClearRefused {}

/// Reacts to lease loss: lockdown, then flatten, at most once per cooldown.
pub struct SplitBrainHandler {
    cfg: SplitBrainConfig,
    lockdown: Lockdown,
    flatten: EmergencyFlatten,
    recorder: AuditRecorder,
    last_triggered: Mutex<Option<Instant>>,
}

impl SplitBrainHandler {
    pub fn new(
        cfg: SplitBrainConfig,
        lockdown: Lockdown,
        flatten: EmergencyFlatten,
        recorder: AuditRecorder,
    ) -> Self {
        Self {
            cfg,
            lockdown,
            flatten,
            recorder,
            last_triggered: Mutex::new(None),
        }
    }

    pub fn lockdown(&self) -> &Lockdown {
        &self.lockdown
    }

    pub async fn handle_loss(&self) -> LossOutcome {
        if !self.cfg.auto_flat {
            tracing::warn!("auto flat on lock loss disabled; not flattening");
            self.recorder
                .record(events::HA_AUTO_FLAT_SKIPPED, json!({ "reason": "disabled" }));
            return LossOutcome::Disabled;
        }

        if self.lockdown.is_locked() {
            return LossOutcome::AlreadyLocked;
        }

        if let Err(outcome) = self.engage() {
            return outcome;
        }
        tracing::error!(lockdown = LockdownState::SplitBrain.as_str(), "lockdown engaged");

        let outcome = self.flatten.execute(FlattenTrigger::SplitBrain).await;
        LossOutcome::Flattened(outcome)
    }

    /// Debounce, then engage the lockdown. The cooldown starts only when this
    /// call is the one that engaged it.
    fn engage(&self) -> Result<(), LossOutcome> {
        let mut last = self
            .last_triggered
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        if let Some(prev) = *last {
            if now.duration_since(prev) < self.cfg.cooldown {
                tracing::info!("split-brain trigger debounced");
                return Err(LossOutcome::Debounced);
            }
        }
        if !self.lockdown.try_engage() {
            return Err(LossOutcome::AlreadyLocked);
        }
        // Set before the adapter call so a slow flatten cannot be
        // re-entered by the next loss.
        *last = Some(now);
        Ok(())
    }

    /// Explicit operator clear of a split-brain lockdown.
    ///
    /// Returns the state before the call. Clearing an already clear lockdown
    /// is a no-op and is not audited.
    pub fn clear_lockdown(
        &self,
        elector_blocked: bool,
        nuclear_active: bool,
    ) -> Result<LockdownState, ClearRefused> {
        if nuclear_active {
            return Err(ClearRefused::NuclearActive);
        }
        if elector_blocked {
            return Err(ClearRefused::ElectorBlocked);
        }
        let prev = self.lockdown.set(LockdownState::None);
        if prev != LockdownState::None {
            tracing::warn!(previous = prev.as_str(), "lockdown cleared by operator");
            self.recorder.record(
                events::HA_LOCKDOWN_CLEARED,
                json!({ "previous": prev.as_str() }),
            );
        }
        Ok(prev)
    }
}
