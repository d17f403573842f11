//! Shutdown coordination for the zone registry.
//!
//! Once shutdown is initiated the registry turns away new move requests;
//! once every hosted zone has been shut down and retracted from the cluster
//! directory, shutdown is marked complete.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Shared shutdown state, cloned into every component that must observe it.
#[derive(Debug, Clone, Default)]
pub struct ShutdownState {
    /// Set when no new moves should be accepted
    shutdown_initiated: Arc<AtomicBool>,
    /// Set when all hosted zones have been released
    shutdown_complete: Arc<AtomicBool>,
}

impl ShutdownState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_initiated.load(Ordering::Acquire)
    }

    pub fn is_shutdown_complete(&self) -> bool {
        self.shutdown_complete.load(Ordering::Acquire)
    }

    /// Stops the registry from accepting new moves.
    pub fn initiate_shutdown(&self) {
        self.shutdown_initiated.store(true, Ordering::Release);
        info!("🛑 Shutdown initiated - no new moves will be accepted");
    }

    /// Marks every hosted zone as released.
    pub fn complete_shutdown(&self) {
        self.shutdown_complete.store(true, Ordering::Release);
        info!("✅ All zones released - ready for final cleanup");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let state = ShutdownState::new();
        let observer = state.clone();
        assert!(!observer.is_shutdown_initiated());

        state.initiate_shutdown();
        assert!(observer.is_shutdown_initiated());
        assert!(!observer.is_shutdown_complete());

        state.complete_shutdown();
        assert!(observer.is_shutdown_complete());
    }
}
