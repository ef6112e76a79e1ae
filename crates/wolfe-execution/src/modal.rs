//! Mode-aware `flat_all` over a position venue.
//!
//! SHADOW reports every position as `shadow` without touching the venue.
//! DRY_RUN reports `skip` with reason `dry_run`. LIVE closes each position;
//! a refused or failed close is reported as `skip` and does not stop the
//! remaining closes.

use crate::{AdapterError, ExecutorMode, FlatResult, FlatStatus, TradingAdapter};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub ticket: u64,
    pub symbol: String,
    pub qty_signed: i64,
}

#[async_trait]
pub trait PositionVenue: Send + Sync {
    async fn positions(&self) -> Result<Vec<Position>, AdapterError>;

    /// Close one position. `Ok(false)` means the venue refused.
    async fn close_position(&self, position: &Position) -> Result<bool, AdapterError>;
}

pub struct ModalAdapter<V> {
    name: String,
    mode: ExecutorMode,
    venue: V,
}

impl<V: PositionVenue> ModalAdapter<V> {
    pub fn new(name: impl Into<String>, mode: ExecutorMode, venue: V) -> Self {
        Self {
            name: name.into(),
            mode,
            venue,
        }
    }

    pub fn venue(&self) -> &V {
        &self.venue
    }
}

#[async_trait]
impl<V: PositionVenue> TradingAdapter for ModalAdapter<V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn mode(&self) -> ExecutorMode {
        self.mode
    }

    async fn flat_all(&self, reason: &str) -> Result<Vec<FlatResult>, AdapterError> {
        let positions = self.venue.positions().await?;
        let mut out = Vec::with_capacity(positions.len());

        for p in positions {
            let (status, why) = match self.mode {
                ExecutorMode::Shadow => (FlatStatus::Shadow, reason.to_string()),
                ExecutorMode::DryRun => (FlatStatus::Skip, "dry_run".to_string()),
                ExecutorMode::Live => match self.venue.close_position(&p).await {
                    Ok(true) => (FlatStatus::Closed, reason.to_string()),
                    Ok(false) => (FlatStatus::Skip, "close_refused".to_string()),
                    Err(e) => {
                        tracing::warn!(ticket = p.ticket, symbol = %p.symbol, error = %e, "close failed");
                        (FlatStatus::Skip, format!("close_failed: {e}"))
                    }
                },
            };
            out.push(FlatResult {
                symbol: p.symbol,
                ticket: p.ticket,
                status,
                reason: why,
            });
        }

        Ok(out)
    }
}

/// Deterministic in-memory venue.
///
/// Tickets are assigned sequentially from 1. `refuse` marks tickets the venue
/// will decline to close.
#[derive(Debug, Default)]
pub struct PaperVenue {
    inner: Mutex<PaperInner>,
}

#[derive(Debug, Default)]
struct PaperInner {
    next_ticket: u64,
    open: BTreeMap<u64, Position>,
    refused: Vec<u64>,
}

impl PaperVenue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, symbol: &str, qty_signed: i64) -> u64 {
        let mut g = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        g.next_ticket += 1;
        let ticket = g.next_ticket;
        g.open.insert(
            ticket,
            Position {
                ticket,
                symbol: symbol.to_string(),
                qty_signed,
            },
        );
        ticket
    }

    pub fn refuse(&self, ticket: u64) {
        let mut g = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        g.refused.push(ticket);
    }

    pub fn open_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .open
            .len()
    }
}

#[async_trait]
impl PositionVenue for PaperVenue {
    async fn positions(&self) -> Result<Vec<Position>, AdapterError> {
        let g = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(g.open.values().cloned().collect())
    }

    async fn close_position(&self, position: &Position) -> Result<bool, AdapterError> {
        let mut g = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if g.refused.contains(&position.ticket) {
            return Ok(false);
        }
        Ok(g.open.remove(&position.ticket).is_some())
    }
}
