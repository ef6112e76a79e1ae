use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockdownState {
    None,
    SplitBrain,
}

impl LockdownState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockdownState::None => "NONE",
            LockdownState::SplitBrain => "SPLIT_BRAIN",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            LockdownState::None => 0,
            LockdownState::SplitBrain => 1,
        }
    }

    fn from_u8(v: u8) -> Self {
        // Any unknown encoding reads as locked.
        if v == 0 {
            LockdownState::None
        } else {
            LockdownState::SplitBrain
        }
    }
}

/// Per-process lockdown flag.
///
/// One instance is created at boot and cloned into the split-brain handler,
/// the nuclear control and every order path. Only those two controls write
/// it; everything else reads it through [`OrderGate`].
#[derive(Debug, Clone, Default)]
pub struct Lockdown {
    state: Arc<AtomicU8>,
}

impl Lockdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LockdownState {
        LockdownState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_locked(&self) -> bool {
        self.state() != LockdownState::None
    }

    /// Set the state and return the previous one.
    pub fn set(&self, next: LockdownState) -> LockdownState {
        LockdownState::from_u8(self.state.swap(next.to_u8(), Ordering::SeqCst))
    }

    /// Transition NONE -> SPLIT_BRAIN. Returns false if already locked.
    pub fn try_engage(&self) -> bool {
        self.state
            .compare_exchange(
                LockdownState::None.to_u8(),
                LockdownState::SplitBrain.to_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }
}

/// Read-only view used by order paths.
pub trait OrderGate {
    fn allows_new_orders(&self) -> bool;

    fn check_new_order(&self) -> Result<(), GateRefusal> {
        if self.allows_new_orders() {
            Ok(())
        } else {
            Err(GateRefusal::Lockdown)
        }
    }
}

impl OrderGate for Lockdown {
    fn allows_new_orders(&self) -> bool {
        !self.is_locked()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateRefusal {
    Lockdown,
}

impl std::fmt::Display for GateRefusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateRefusal::Lockdown => write!(f, "GATE_REFUSED: lockdown active"),
        }
    }
}

impl std::error::Error for GateRefusal {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state_and_gate_follows() {
        let a = Lockdown::new();
        let b = a.clone();
        assert!(b.check_new_order().is_ok());

        assert!(a.try_engage());
        assert!(!a.try_engage(), "second engage must report already locked");
        assert_eq!(b.state(), LockdownState::SplitBrain);
        assert_eq!(b.check_new_order(), Err(GateRefusal::Lockdown));

        assert_eq!(b.set(LockdownState::None), LockdownState::SplitBrain);
        assert!(a.allows_new_orders());
    }
}
