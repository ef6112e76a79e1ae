//! Shared runtime state for wolfe-daemon.
//!
//! One [`Lockdown`] and one [`AuditRecorder`] are created here and injected
//! into the split-brain handler, the nuclear control and the handlers.

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use anyhow::Result;
use wolfe_audit::{AuditLog, AuditRecorder};
use wolfe_config::{ResolvedSecrets, Settings};
use wolfe_execution::{AdapterSlot, EmergencyFlatten, ExecutorMode, Lockdown};
use wolfe_ha::{ElectorConfig, LeaderElector, SplitBrainConfig, SplitBrainHandler};
use wolfe_lock::LockService;
use wolfe_nuclear::NuclearControl;

static START: OnceLock<Instant> = OnceLock::new();

pub fn uptime_secs() -> u64 {
    START.get_or_init(Instant::now).elapsed().as_secs()
}

#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Clone)]
pub struct AppState {
    pub build: BuildInfo,
    pub node_id: String,
    pub mode: ExecutorMode,
    /// `None` means every protected route answers 401.
    pub dash_token: Option<String>,
    pub lockdown: Lockdown,
    pub adapters: AdapterSlot,
    pub recorder: AuditRecorder,
    pub elector: Arc<LeaderElector>,
    pub nuclear: Arc<NuclearControl>,
}

impl AppState {
    /// Wire every safety component for one node.
    pub fn assemble(
        settings: &Settings,
        secrets: &ResolvedSecrets,
        svc: Arc<dyn LockService>,
        audit: Arc<AuditLog>,
        adapters: AdapterSlot,
    ) -> Result<Self> {
        let _ = uptime_secs();
        settings.validate()?;

        let mode: ExecutorMode = settings.executor_mode.parse()?;
        let lockdown = Lockdown::new();
        let recorder = AuditRecorder::new(audit);
        let flatten = EmergencyFlatten::new(adapters.clone(), recorder.clone());

        let handler = Arc::new(SplitBrainHandler::new(
            SplitBrainConfig::from_settings(&settings.ha),
            lockdown.clone(),
            flatten.clone(),
            recorder.clone(),
        ));
        let elector = Arc::new(LeaderElector::new(
            ElectorConfig::from_settings(settings)?,
            svc,
            handler,
            recorder.clone(),
        ));
        let nuclear = Arc::new(NuclearControl::from_settings(
            &settings.nuclear,
            secrets.nuclear_pubkey.as_deref(),
            lockdown.clone(),
            flatten,
            recorder.clone(),
        )?);

        Ok(Self {
            build: BuildInfo {
                service: "wolfe-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            node_id: settings.node_id.clone(),
            mode,
            dash_token: secrets.dash_token.clone(),
            lockdown,
            adapters,
            recorder,
            elector,
            nuclear,
        })
    }
}
