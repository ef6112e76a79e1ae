//! Leader election and split-brain failsafe.
//!
//! # Invariants
//! - At most one node believes it is leader within one TTL window.
//! - Fencing tokens observed by a node strictly increase and are never reused.
//! - Loss of the lease always runs the split-brain handler before any
//!   re-acquisition attempt, and the node stays blocked until a human ack
//!   newer than the loss is present.
//! - Lockdown is set before `flat_all` is called.

mod elector;
mod split_brain;

pub use elector::{ElectorConfig, ElectorStatus, LeaderElector, LeaseState, Phase};
pub use split_brain::{ClearRefused, LossOutcome, SplitBrainConfig, SplitBrainHandler};
