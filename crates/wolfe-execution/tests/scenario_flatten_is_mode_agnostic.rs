//! Scenario: emergency flatten works in every execution mode.
//!
//! # Invariants under test
//! - SHADOW reports `shadow` per position and leaves the venue untouched.
//! - DRY_RUN reports `skip` with reason `dry_run`.
//! - LIVE closes positions; a refused close is `skip` and does not stop the rest.
//! - Exactly one FLAT_ALL_EXECUTED is audited per flatten, with the mode.
//! - An empty slot audits the trigger-specific skip event.
//! - A venue outage audits FLAT_ALL_FAILED.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use wolfe_audit::{events, AuditKey, AuditLog, AuditRecorder};
use wolfe_execution::{
    AdapterError, AdapterSlot, EmergencyFlatten, ExecutorMode, FlatStatus, FlattenOutcome,
    FlattenTrigger, ModalAdapter, PaperVenue, Position, PositionVenue,
};

fn recorder(dir: &tempfile::TempDir) -> AuditRecorder {
    let log = AuditLog::open(dir.path(), &AuditKey::generate()).unwrap();
    AuditRecorder::new(Arc::new(log))
}

fn event_types(rec: &AuditRecorder) -> Vec<String> {
    rec.log()
        .read_day(Utc::now().date_naive())
        .unwrap_or_default()
        .into_iter()
        .map(|r| r.event_type)
        .collect()
}

fn venue_with_two() -> PaperVenue {
    let v = PaperVenue::new();
    v.open("EURUSD", 100_000);
    v.open("XAUUSD", -10);
    v
}

#[tokio::test]
async fn shadow_reports_without_touching_venue() {
    let dir = tempfile::tempdir().unwrap();
    let rec = recorder(&dir);
    let adapter = Arc::new(ModalAdapter::new("paper", ExecutorMode::Shadow, venue_with_two()));
    let flatten = EmergencyFlatten::new(AdapterSlot::with_adapter(adapter.clone()), rec.clone());

    let FlattenOutcome::Executed { results } = flatten.execute(FlattenTrigger::SplitBrain).await
    else {
        panic!("expected Executed");
    };
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.status == FlatStatus::Shadow));
    assert!(results.iter().all(|r| r.reason == "split_brain"));
    assert_eq!(adapter.venue().open_count(), 2, "shadow must not close");

    let day = rec.log().read_day(Utc::now().date_naive()).unwrap();
    assert_eq!(day.len(), 1);
    assert_eq!(day[0].event_type, events::FLAT_ALL_EXECUTED);
    assert_eq!(day[0].payload["mode"], "SHADOW");
    assert_eq!(day[0].payload["count"], 2);
}

#[tokio::test]
async fn dry_run_skips_every_position() {
    let dir = tempfile::tempdir().unwrap();
    let rec = recorder(&dir);
    let adapter = Arc::new(ModalAdapter::new("paper", ExecutorMode::DryRun, venue_with_two()));
    let flatten = EmergencyFlatten::new(AdapterSlot::with_adapter(adapter.clone()), rec);

    let FlattenOutcome::Executed { results } = flatten.execute(FlattenTrigger::Nuclear).await
    else {
        panic!("expected Executed");
    };
    assert!(results
        .iter()
        .all(|r| r.status == FlatStatus::Skip && r.reason == "dry_run"));
    assert_eq!(adapter.venue().open_count(), 2);
}

#[tokio::test]
async fn live_closes_and_reports_refusals() {
    let dir = tempfile::tempdir().unwrap();
    let rec = recorder(&dir);
    let venue = venue_with_two();
    venue.refuse(2);
    let adapter = Arc::new(ModalAdapter::new("paper", ExecutorMode::Live, venue));
    let flatten = EmergencyFlatten::new(AdapterSlot::with_adapter(adapter.clone()), rec);

    let FlattenOutcome::Executed { results } = flatten.execute(FlattenTrigger::SplitBrain).await
    else {
        panic!("expected Executed");
    };
    assert_eq!(results[0].ticket, 1);
    assert_eq!(results[0].status, FlatStatus::Closed);
    assert_eq!(results[1].ticket, 2);
    assert_eq!(results[1].status, FlatStatus::Skip);
    assert_eq!(adapter.venue().open_count(), 1);
}

#[tokio::test]
async fn empty_book_is_an_empty_result() {
    let dir = tempfile::tempdir().unwrap();
    let rec = recorder(&dir);
    let adapter = Arc::new(ModalAdapter::new("paper", ExecutorMode::Live, PaperVenue::new()));
    let flatten = EmergencyFlatten::new(AdapterSlot::with_adapter(adapter), rec);

    assert_eq!(
        flatten.execute(FlattenTrigger::SplitBrain).await,
        FlattenOutcome::Executed { results: vec![] }
    );
}

#[tokio::test]
async fn no_adapter_audits_trigger_specific_skip() {
    let dir = tempfile::tempdir().unwrap();
    let rec = recorder(&dir);
    let flatten = EmergencyFlatten::new(AdapterSlot::new(), rec.clone());

    assert_eq!(
        flatten.execute(FlattenTrigger::SplitBrain).await,
        FlattenOutcome::NoAdapter
    );
    assert_eq!(
        flatten.execute(FlattenTrigger::Nuclear).await,
        FlattenOutcome::NoAdapter
    );
    assert_eq!(
        event_types(&rec),
        vec![events::HA_AUTO_FLAT_SKIPPED, events::NUCLEAR_FLAT_SKIPPED]
    );
}

struct DownVenue;

#[async_trait]
impl PositionVenue for DownVenue {
    async fn positions(&self) -> Result<Vec<Position>, AdapterError> {
        Err(AdapterError::Unavailable("bridge offline".to_string()))
    }

    async fn close_position(&self, _: &Position) -> Result<bool, AdapterError> {
        Ok(false)
    }
}

#[tokio::test]
async fn venue_outage_audits_failure() {
    let dir = tempfile::tempdir().unwrap();
    let rec = recorder(&dir);
    let adapter = Arc::new(ModalAdapter::new("down", ExecutorMode::Live, DownVenue));
    let flatten = EmergencyFlatten::new(AdapterSlot::with_adapter(adapter), rec.clone());

    assert!(matches!(
        flatten.execute(FlattenTrigger::SplitBrain).await,
        FlattenOutcome::Failed { .. }
    ));
    assert_eq!(event_types(&rec), vec![events::FLAT_ALL_FAILED]);
}
