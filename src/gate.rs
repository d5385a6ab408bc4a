use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Process-wide readiness flag shared between the orchestrator and the scheduler.
///
/// Written once, after the node has been connected and verified; there is no
/// way back to `Disconnected`.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    state: Arc<AtomicU8>,
}

const DISCONNECTED: u8 = 0;
const CONNECTED: u8 = 1;

impl ReadinessGate {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(DISCONNECTED)),
        }
    }

    pub fn mark_connected(&self) {
        self.state.store(CONNECTED, Ordering::Release);
    }

    pub fn state(&self) -> ConnectionState {
        match self.state.load(Ordering::Acquire) {
            CONNECTED => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected() {
        let gate = ReadinessGate::new();
        assert_eq!(gate.state(), ConnectionState::Disconnected);
        assert!(!gate.is_ready());
    }

    #[test]
    fn clones_observe_the_transition() {
        let gate = ReadinessGate::new();
        let observer = gate.clone();
        gate.mark_connected();
        assert!(observer.is_ready());
    }
}
