//! Bounds applied to every move request.

use std::time::Duration;

/// Timeouts and lock timing used by the zone registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementConfig {
    /// Longest a move waits for a zone or scene to resolve
    pub resolution_timeout: Duration,
    /// Longest a move waits to acquire the zone host lock
    pub lock_wait: Duration,
    /// Delay between attempts to acquire the zone host lock
    pub lock_poll_interval: Duration,
    /// Lease granted to the holder of a zone host lock
    pub lock_lease: Duration,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            resolution_timeout: Duration::from_secs(10),
            lock_wait: Duration::from_secs(5),
            lock_poll_interval: Duration::from_millis(50),
            lock_lease: Duration::from_secs(60),
        }
    }
}
