//! Lease-based leader election with fencing tokens.
//!
//! ```text
//!            acquire ok                     extend refused / lease unconfirmed
//! FOLLOWER ─────────────► LEADER ───────────────────────────────────────────► BLOCKED
//!    ▲  └─ held: retry ───┘ └─ extend ok: stay                                   │
//!    └──────────────────────────── ack newer than the loss ─────────────────────┘
//! ```
//!
//! Every lock-service call runs under `op_timeout_ms`. A timeout or backend
//! error is transient: it is logged and retried on the next tick and never
//! makes a node leader.
//!
//! A lease is confirmed as of the moment the acquire or extend was *sent*.
//! `is_leader` turns false once `ttl - op_timeout` has passed since the last
//! confirmation, and a failed heartbeat is a loss when the next one could not
//! finish inside the TTL.

use crate::split_brain::{ClearRefused, SplitBrainHandler};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use wolfe_audit::{events, AuditRecorder};
use wolfe_config::{HaSettings, Settings};
use wolfe_execution::LockdownState;
use wolfe_lock::ack::{parse_ack, read_ack, write_ack};
use wolfe_lock::{timed, LockError, LockKeys, LockService};

#[derive(Debug, Clone)]
pub struct ElectorConfig {
    pub node_id: String,
    pub lock_key: String,
    pub ttl_ms: u64,
    pub heartbeat_ms: u64,
    pub op_timeout_ms: u64,
}

impl ElectorConfig {
    pub fn from_settings(s: &Settings) -> anyhow::Result<Self> {
        s.validate()?;
        Ok(Self {
            node_id: s.node_id.clone(),
            lock_key: s.ha.lock_key.clone(),
            ttl_ms: s.ha.ttl_ms,
            heartbeat_ms: s.ha.heartbeat_ms,
            op_timeout_ms: s.ha.op_timeout_ms,
        })
    }

    /// Same timing rules as [`HaSettings::validate`].
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.node_id.trim().is_empty() {
            anyhow::bail!("CONFIG_INVALID node_id must not be empty");
        }
        HaSettings {
            lock_key: self.lock_key.clone(),
            ttl_ms: self.ttl_ms,
            heartbeat_ms: self.heartbeat_ms,
            op_timeout_ms: self.op_timeout_ms,
            ..HaSettings::default()
        }
        .validate()
    }

    fn op_budget(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    /// How long a confirmation is trusted by `is_leader`.
    fn trust_window(&self) -> Duration {
        Duration::from_millis(self.ttl_ms.saturating_sub(self.op_timeout_ms))
    }

    /// Confirmation age past which a failed heartbeat is a loss.
    fn retry_window(&self) -> Duration {
        Duration::from_millis(
            self.ttl_ms
                .saturating_sub(self.heartbeat_ms)
                .saturating_sub(self.op_timeout_ms),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Follower,
    Leader,
    /// Lease was lost; waiting for a human ack before competing again.
    Blocked,
}

/// Lease as this node believes it to be.
///
/// `is_leader` implies `fencing_token` and `lease_value` are set and were
/// last confirmed by the lock service within the current TTL window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LeaseState {
    pub is_leader: bool,
    pub fencing_token: Option<u64>,
    pub lease_value: Option<String>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ElectorStatus {
    pub node_id: String,
    pub running: bool,
    pub phase: Phase,
    pub is_leader: bool,
    pub fencing_token: Option<u64>,
    /// Most recent token this node held, kept after the lease is gone.
    pub fencing_token_tail: Option<u64>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub last_heartbeat_age_ms: Option<i64>,
    pub blocked_since: Option<DateTime<Utc>>,
    pub lockdown_active: bool,
    pub lockdown: &'static str,
}

struct Inner {
    phase: Phase,
    lease: LeaseState,
    last_token: Option<u64>,
    blocked_since: Option<DateTime<Utc>>,
    /// Send time of the last acquire or extend the service accepted.
    last_confirmed: Option<Instant>,
}

struct LoopTask {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

pub struct LeaderElector {
    cfg: ElectorConfig,
    keys: LockKeys,
    svc: Arc<dyn LockService>,
    handler: Arc<SplitBrainHandler>,
    recorder: AuditRecorder,
    /// Serializes ticks, release and loss handling.
    tick_lock: tokio::sync::Mutex<()>,
    state: RwLock<Inner>,
    task: Mutex<Option<LoopTask>>,
}

impl LeaderElector {
    pub fn new(
        cfg: ElectorConfig,
        svc: Arc<dyn LockService>,
        handler: Arc<SplitBrainHandler>,
        recorder: AuditRecorder,
    ) -> Self {
        let keys = LockKeys::new(&cfg.lock_key);
        Self {
            cfg,
            keys,
            svc,
            handler,
            recorder,
            tick_lock: tokio::sync::Mutex::new(()),
            state: RwLock::new(Inner {
                phase: Phase::Follower,
                lease: LeaseState::default(),
                last_token: None,
                blocked_since: None,
                last_confirmed: None,
            }),
            task: Mutex::new(None),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.cfg.node_id
    }

    pub fn handler(&self) -> &Arc<SplitBrainHandler> {
        &self.handler
    }

    fn read<T>(&self, f: impl FnOnce(&Inner) -> T) -> T {
        let g = self.state.read().unwrap_or_else(|e| e.into_inner());
        f(&g)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        let mut g = self.state.write().unwrap_or_else(|e| e.into_inner());
        f(&mut g)
    }

    pub fn phase(&self) -> Phase {
        self.read(|s| s.phase)
    }

    fn confirmed_within(&self, s: &Inner, window: Duration) -> bool {
        s.last_confirmed.is_some_and(|t| t.elapsed() < window)
    }

    fn leader_now(&self, s: &Inner) -> bool {
        s.lease.is_leader && self.confirmed_within(s, self.cfg.trust_window())
    }

    pub fn is_leader(&self) -> bool {
        self.read(|s| self.leader_now(s))
    }

    /// Lease snapshot. `is_leader` is false once the confirmation is stale,
    /// even before the next tick records the loss.
    pub fn lease(&self) -> LeaseState {
        self.read(|s| LeaseState {
            is_leader: self.leader_now(s),
            ..s.lease.clone()
        })
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    pub fn status(&self) -> ElectorStatus {
        let running = self.is_running();
        let lockdown = self.handler.lockdown().state();
        let now = Utc::now();
        self.read(|s| ElectorStatus {
            node_id: self.cfg.node_id.clone(),
            running,
            phase: s.phase,
            is_leader: self.leader_now(s),
            fencing_token: s.lease.fencing_token,
            fencing_token_tail: s.last_token,
            last_heartbeat_at: s.lease.last_heartbeat_at,
            last_heartbeat_age_ms: s
                .lease
                .last_heartbeat_at
                .map(|t| (now - t).num_milliseconds()),
            blocked_since: s.blocked_since,
            lockdown_active: lockdown != LockdownState::None,
            lockdown: lockdown.as_str(),
        })
    }

    /// Run one state-machine step and return the resulting phase.
    pub async fn tick(&self) -> Phase {
        let _serial = self.tick_lock.lock().await;
        match self.phase() {
            Phase::Leader => self.heartbeat().await,
            Phase::Follower => self.try_acquire().await,
            Phase::Blocked => {
                if self.consume_ack().await {
                    self.try_acquire().await;
                }
            }
        }
        self.phase()
    }

    async fn heartbeat(&self) {
        let Some((value, token)) = self.read(|s| {
            s.lease
                .lease_value
                .clone()
                .zip(s.lease.fencing_token)
        }) else {
            // Leader without a lease value cannot be confirmed.
            self.on_loss("lease_state_inconsistent").await;
            return;
        };

        if !self.read(|s| self.confirmed_within(s, self.cfg.trust_window())) {
            tracing::error!(node_id = %self.cfg.node_id, token, "lease confirmation expired before heartbeat");
            self.on_loss("lease_unconfirmed").await;
            return;
        }

        let sent = Instant::now();
        let res = timed(
            "extend_if_value",
            self.cfg.op_budget(),
            self.svc
                .extend_if_value(&self.keys.lock, &value, self.cfg.ttl_ms),
        )
        .await;

        match res {
            Ok(true) => {
                let now = Utc::now();
                self.write(|s| {
                    s.lease.last_heartbeat_at = Some(now);
                    s.last_confirmed = Some(sent);
                });
                tracing::trace!(node_id = %self.cfg.node_id, token, "lease extended");
            }
            Ok(false) => {
                tracing::error!(node_id = %self.cfg.node_id, token, "lease no longer ours");
                self.on_loss("lease_lost").await;
            }
            Err(e) => {
                let stale = !self.read(|s| self.confirmed_within(s, self.cfg.retry_window()));
                tracing::warn!(node_id = %self.cfg.node_id, token, error = %e, stale, "heartbeat failed");
                if stale {
                    self.on_loss("lease_unconfirmed").await;
                }
            }
        }
    }

    async fn try_acquire(&self) {
        let budget = self.cfg.op_budget();

        let token = match timed("incr", budget, self.svc.incr(&self.keys.token)).await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(node_id = %self.cfg.node_id, error = %e, "fencing token incr failed");
                return;
            }
        };

        if let Some(last) = self.read(|s| s.last_token) {
            if token <= last {
                tracing::error!(node_id = %self.cfg.node_id, token, last, "fencing token regression");
                self.recorder.record(
                    events::HA_FENCING_REGRESSION,
                    json!({ "node": self.cfg.node_id, "token": token, "last": last }),
                );
                return;
            }
        }

        let value = format!("{}:{}", self.cfg.node_id, token);
        let sent = Instant::now();
        let res = timed(
            "set_nx_px",
            budget,
            self.svc.set_nx_px(&self.keys.lock, &value, self.cfg.ttl_ms),
        )
        .await;

        match res {
            Ok(true) => {
                let now = Utc::now();
                self.write(|s| {
                    s.phase = Phase::Leader;
                    s.lease = LeaseState {
                        is_leader: true,
                        fencing_token: Some(token),
                        lease_value: Some(value),
                        last_heartbeat_at: Some(now),
                    };
                    s.last_token = Some(token);
                    s.blocked_since = None;
                    s.last_confirmed = Some(sent);
                });
                tracing::info!(node_id = %self.cfg.node_id, token, "leadership acquired");
                self.recorder.record(
                    events::HA_LEADER_ACQUIRED,
                    json!({ "node": self.cfg.node_id, "token": token }),
                );
            }
            Ok(false) => {
                tracing::debug!(node_id = %self.cfg.node_id, token, "lease held elsewhere");
            }
            Err(e) => {
                tracing::warn!(node_id = %self.cfg.node_id, token, error = %e, "acquire failed");
            }
        }
    }

    async fn on_loss(&self, reason: &str) {
        let loss_at = truncate_to_millis(Utc::now());
        let token = self.write(|s| {
            s.lease.is_leader = false;
            s.lease.lease_value = None;
            s.last_confirmed = None;
            s.lease.fencing_token.take()
        });

        self.recorder.record(
            events::HA_LOCK_LOST,
            json!({ "node": self.cfg.node_id, "token": token, "reason": reason }),
        );

        let outcome = self.handler.handle_loss().await;
        tracing::error!(node_id = %self.cfg.node_id, ?token, reason, ?outcome, "lease lost; blocked until ack");

        self.write(|s| {
            s.phase = Phase::Blocked;
            s.blocked_since = Some(loss_at);
        });
    }

    /// Lift the block if an ack newer than the loss exists.
    async fn consume_ack(&self) -> bool {
        let Some(since) = self.read(|s| s.blocked_since) else {
            return false;
        };

        let raw = match timed("hget", self.cfg.op_budget(), read_ack(self.svc.as_ref())).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(node_id = %self.cfg.node_id, error = %e, "ack read failed");
                return false;
            }
        };

        let Some(ack_at) = parse_ack(&raw) else {
            tracing::warn!(node_id = %self.cfg.node_id, ack = %raw, "unparseable ack ignored");
            return false;
        };
        if ack_at < since {
            return false;
        }

        self.write(|s| {
            s.phase = Phase::Follower;
            s.blocked_since = None;
        });
        tracing::info!(node_id = %self.cfg.node_id, ack = %raw, "ack consumed; competing again");
        self.recorder.record(
            events::HA_ACK_CONSUMED,
            json!({ "node": self.cfg.node_id, "ack": raw }),
        );
        true
    }

    /// Write the human ack to the shared lock service and audit it.
    pub async fn acknowledge(&self) -> Result<String, LockError> {
        let iso = timed(
            "hset",
            self.cfg.op_budget(),
            write_ack(self.svc.as_ref(), Utc::now()),
        )
        .await?;
        tracing::warn!(node_id = %self.cfg.node_id, ack = %iso, "split-brain ack written");
        self.recorder.record(
            events::HA_HUMAN_ACK,
            json!({ "node": self.cfg.node_id, "ack": iso }),
        );
        Ok(iso)
    }

    /// Explicit operator clear of the split-brain lockdown.
    pub fn clear_lockdown(&self, nuclear_active: bool) -> Result<LockdownState, ClearRefused> {
        self.handler
            .clear_lockdown(self.phase() == Phase::Blocked, nuclear_active)
    }

    /// Start the background tick loop. Returns false if already running or
    /// if the config cannot drive a loop.
    pub fn spawn(self: &Arc<Self>) -> bool {
        if let Err(e) = self.cfg.validate() {
            tracing::error!(node_id = %self.cfg.node_id, error = %e, "elector loop not started");
            return false;
        }
        let mut slot = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return false;
        }

        let (tx, mut rx) = watch::channel(false);
        let me = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(me.cfg.heartbeat_ms));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(node_id = %me.cfg.node_id, "elector loop started");
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        me.tick().await;
                    }
                    _ = rx.changed() => break,
                }
            }
            tracing::info!(node_id = %me.cfg.node_id, "elector loop stopped");
        });

        *slot = Some(LoopTask {
            handle,
            shutdown: tx,
        });
        true
    }

    /// Stop the loop and voluntarily release the lease if held.
    pub async fn stop(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(t) = task {
            let _ = t.shutdown.send(true);
            if let Err(e) = t.handle.await {
                tracing::warn!(node_id = %self.cfg.node_id, error = %e, "elector loop join failed");
            }
        }
        self.release().await;
    }

    async fn release(&self) {
        let _serial = self.tick_lock.lock().await;
        let Some((value, token)) = self.read(|s| {
            s.lease
                .lease_value
                .clone()
                .zip(s.lease.fencing_token)
                .filter(|_| s.lease.is_leader)
        }) else {
            return;
        };

        let released = match timed(
            "release_if_value",
            self.cfg.op_budget(),
            self.svc.release_if_value(&self.keys.lock, &value),
        )
        .await
        {
            Ok(r) => r,
            Err(e) => {
                // The lease expires on its own after the TTL.
                tracing::warn!(node_id = %self.cfg.node_id, token, error = %e, "lease release failed");
                false
            }
        };

        self.write(|s| {
            s.phase = Phase::Follower;
            s.lease = LeaseState::default();
            s.last_confirmed = None;
        });
        tracing::info!(node_id = %self.cfg.node_id, token, released, "leadership released");
        self.recorder.record(
            events::HA_LEADER_RELEASED,
            json!({ "node": self.cfg.node_id, "token": token, "released": released }),
        );
    }
}

fn truncate_to_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(t.timestamp_millis()).unwrap_or(t)
}
