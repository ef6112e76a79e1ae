//! Audit event type names. Stable strings: operators grep for them.

pub const HA_LEADER_ACQUIRED: &str = "HA_LEADER_ACQUIRED";
pub const HA_LEADER_RELEASED: &str = "HA_LEADER_RELEASED";
pub const HA_LOCK_LOST: &str = "HA_LOCK_LOST";
pub const HA_FENCING_REGRESSION: &str = "HA_FENCING_REGRESSION";
pub const HA_HUMAN_ACK: &str = "HA_HUMAN_ACK";
pub const HA_ACK_CONSUMED: &str = "HA_ACK_CONSUMED";
pub const HA_AUTO_FLAT_SKIPPED: &str = "HA_AUTO_FLAT_SKIPPED";
pub const HA_LOCKDOWN_CLEARED: &str = "HA_LOCKDOWN_CLEARED";

pub const FLAT_ALL_EXECUTED: &str = "FLAT_ALL_EXECUTED";
pub const FLAT_ALL_FAILED: &str = "FLAT_ALL_FAILED";

pub const NUCLEAR_LOCKED: &str = "NUCLEAR_LOCKED";
pub const NUCLEAR_FLAT_SKIPPED: &str = "NUCLEAR_FLAT_SKIPPED";
pub const NUCLEAR_RESUMED: &str = "NUCLEAR_RESUMED";
pub const NUCLEAR_RESUME_REJECTED: &str = "NUCLEAR_RESUME_REJECTED";
