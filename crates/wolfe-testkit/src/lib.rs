//! Test fixtures shared by the cross-crate scenarios.
//!
//! [`NodeBuilder`] wires one complete node (elector, split-brain handler,
//! nuclear control, audit log) against a caller-supplied lock service, with a
//! [`RecordingAdapter`] standing in for the broker bridge.

mod recording;

pub use recording::{FlatCall, RecordingAdapter};

use anyhow::Result;
use chrono::Utc;
use ed25519_dalek::SigningKey;
use std::sync::Arc;
use std::time::Duration;
use wolfe_audit::{AuditKey, AuditLog, AuditRecorder};
use wolfe_execution::{AdapterSlot, EmergencyFlatten, Lockdown};
use wolfe_ha::{ElectorConfig, LeaderElector, SplitBrainConfig, SplitBrainHandler};
use wolfe_lock::LockService;
use wolfe_nuclear::NuclearControl;

pub const TEST_LOCK_KEY: &str = "test:ha:lock";

/// One fully wired node. The audit directory lives as long as the node.
pub struct TestNode {
    pub node_id: String,
    pub elector: Arc<LeaderElector>,
    pub nuclear: NuclearControl,
    pub lockdown: Lockdown,
    pub recorder: AuditRecorder,
    pub adapter: Arc<RecordingAdapter>,
    pub signing_key: SigningKey,
    _dir: tempfile::TempDir,
}

impl TestNode {
    /// Event types audited today, in append order.
    pub fn events(&self) -> Vec<String> {
        self.recorder
            .log()
            .read_day(Utc::now().date_naive())
            .unwrap_or_default()
            .into_iter()
            .map(|r| r.event_type)
            .collect()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    /// Today's chain must verify; panics with the verdict otherwise.
    pub fn assert_audit_intact(&self) {
        let verdict = self
            .recorder
            .log()
            .validate_day(Utc::now().date_naive())
            .unwrap_or_else(|e| panic!("{}: audit read failed: {e:#}", self.node_id));
        assert!(verdict.is_valid(), "{}: audit chain {verdict:?}", self.node_id);
    }
}

pub struct NodeBuilder {
    node_id: String,
    svc: Arc<dyn LockService>,
    ttl_ms: u64,
    heartbeat_ms: u64,
    op_timeout_ms: u64,
    split_brain: SplitBrainConfig,
    with_adapter: bool,
}

impl NodeBuilder {
    pub fn new(node_id: &str, svc: Arc<dyn LockService>) -> Self {
        Self {
            node_id: node_id.to_string(),
            svc,
            ttl_ms: 3000,
            heartbeat_ms: 1000,
            op_timeout_ms: 500,
            split_brain: SplitBrainConfig::default(),
            with_adapter: true,
        }
    }

    pub fn ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    pub fn heartbeat_ms(mut self, heartbeat_ms: u64) -> Self {
        self.heartbeat_ms = heartbeat_ms;
        self
    }

    pub fn op_timeout_ms(mut self, op_timeout_ms: u64) -> Self {
        self.op_timeout_ms = op_timeout_ms;
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.split_brain.cooldown = cooldown;
        self
    }

    pub fn auto_flat(mut self, on: bool) -> Self {
        self.split_brain.auto_flat = on;
        self
    }

    /// Leave the adapter slot empty (the adapter is still created, unregistered).
    pub fn without_adapter(mut self) -> Self {
        self.with_adapter = false;
        self
    }

    /// Fails on timings the elector would refuse to run with.
    pub fn build(self) -> Result<TestNode> {
        let cfg = ElectorConfig {
            node_id: self.node_id.clone(),
            lock_key: TEST_LOCK_KEY.to_string(),
            ttl_ms: self.ttl_ms,
            heartbeat_ms: self.heartbeat_ms,
            op_timeout_ms: self.op_timeout_ms,
        };
        cfg.validate()?;

        let dir = tempfile::tempdir()?;
        let log = AuditLog::open(dir.path(), &AuditKey::generate())?;
        let recorder = AuditRecorder::new(Arc::new(log));
        let lockdown = Lockdown::new();

        let adapter = Arc::new(RecordingAdapter::new(lockdown.clone()));
        let slot = if self.with_adapter {
            AdapterSlot::with_adapter(adapter.clone())
        } else {
            AdapterSlot::new()
        };
        let flatten = EmergencyFlatten::new(slot, recorder.clone());

        let handler = Arc::new(SplitBrainHandler::new(
            self.split_brain,
            lockdown.clone(),
            flatten.clone(),
            recorder.clone(),
        ));
        let elector = Arc::new(LeaderElector::new(
            cfg,
            self.svc,
            handler,
            recorder.clone(),
        ));

        let signing_key = wolfe_nuclear::generate_signing_key();
        let nuclear = NuclearControl::new(
            wolfe_nuclear::parse_timezone("Europe/Prague")?,
            Some(signing_key.verifying_key()),
            lockdown.clone(),
            flatten,
            recorder.clone(),
        );

        Ok(TestNode {
            node_id: self.node_id,
            elector,
            nuclear,
            lockdown,
            recorder,
            adapter,
            signing_key,
            _dir: dir,
        })
    }
}
