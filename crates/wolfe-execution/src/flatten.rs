use crate::{AdapterSlot, FlatResult};
use serde_json::json;
use wolfe_audit::{events, AuditRecorder};

/// Who asked for the flatten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlattenTrigger {
    SplitBrain,
    Nuclear,
}

impl FlattenTrigger {
    /// Reason passed to `flat_all` and written to the audit trail.
    pub fn reason(&self) -> &'static str {
        match self {
            FlattenTrigger::SplitBrain => "split_brain",
            FlattenTrigger::Nuclear => "nuclear",
        }
    }

    fn skip_event(&self) -> &'static str {
        match self {
            FlattenTrigger::SplitBrain => events::HA_AUTO_FLAT_SKIPPED,
            FlattenTrigger::Nuclear => events::NUCLEAR_FLAT_SKIPPED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlattenOutcome {
    Executed { results: Vec<FlatResult> },
    NoAdapter,
    Failed { error: String },
}

/// Calls `flat_all` on the registered adapter and audits the outcome.
///
/// Never returns an error: the caller has already engaged lockdown and the
/// outcome is recorded either way.
#[derive(Clone)]
pub struct EmergencyFlatten {
    slot: AdapterSlot,
    recorder: AuditRecorder,
}

impl EmergencyFlatten {
    pub fn new(slot: AdapterSlot, recorder: AuditRecorder) -> Self {
        Self { slot, recorder }
    }

    pub fn slot(&self) -> &AdapterSlot {
        &self.slot
    }

    pub async fn execute(&self, trigger: FlattenTrigger) -> FlattenOutcome {
        let reason = trigger.reason();

        let Some(adapter) = self.slot.get() else {
            tracing::warn!(reason, "no trading adapter registered; flatten skipped");
            self.recorder
                .record(trigger.skip_event(), json!({ "reason": "no_adapter" }));
            return FlattenOutcome::NoAdapter;
        };

        let mode = adapter.mode();
        match adapter.flat_all(reason).await {
            Ok(results) => {
                tracing::warn!(
                    reason,
                    mode = mode.as_str(),
                    adapter = adapter.name(),
                    count = results.len(),
                    "flat_all executed"
                );
                self.recorder.record(
                    events::FLAT_ALL_EXECUTED,
                    json!({
                        "mode": mode.as_str(),
                        "count": results.len(),
                        "reason": reason,
                    }),
                );
                FlattenOutcome::Executed { results }
            }
            Err(e) => {
                tracing::error!(reason, mode = mode.as_str(), error = %e, "flat_all failed");
                self.recorder.record(
                    events::FLAT_ALL_FAILED,
                    json!({
                        "mode": mode.as_str(),
                        "reason": reason,
                        "error": e.to_string(),
                    }),
                );
                FlattenOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}
