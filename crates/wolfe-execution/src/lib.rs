//! Execution-side contracts shared by HA and the nuclear stop.
//!
//! - [`TradingAdapter`]: the only operation the safety layer needs from a
//!   broker bridge is `flat_all`.
//! - [`AdapterSlot`]: explicit "no adapter registered" branch.
//! - [`Lockdown`]: per-process order-submission gate, injected everywhere.
//! - [`EmergencyFlatten`]: flatten + audit, shared by split-brain and nuclear.

mod adapter;
mod flatten;
mod lockdown;
mod modal;
mod mode;

pub use adapter::{AdapterError, AdapterSlot, FlatResult, FlatStatus, TradingAdapter};
pub use flatten::{EmergencyFlatten, FlattenOutcome, FlattenTrigger};
pub use lockdown::{GateRefusal, Lockdown, LockdownState, OrderGate};
pub use modal::{ModalAdapter, PaperVenue, Position, PositionVenue};
pub use mode::{ExecutorMode, ModeParseError};
