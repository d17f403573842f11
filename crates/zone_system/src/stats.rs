//! Move and resolution counters.
//!
//! Counters are updated with relaxed atomics from any task; [`MoveStats::snapshot`]
//! copies them into a plain [`ZoneRegistryStats`] value for logging.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters owned by a zone registry.
#[derive(Debug, Default)]
pub struct MoveStats {
    moves_requested: AtomicU64,
    moves_succeeded: AtomicU64,
    moves_failed: AtomicU64,
    moves_vetoed: AtomicU64,
    server_switches: AtomicU64,
    zones_resolved: AtomicU64,
}

impl MoveStats {
    pub fn record_requested(&self) {
        self.moves_requested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_succeeded(&self) {
        self.moves_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.moves_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Vetoes also count as failures.
    pub fn record_vetoed(&self) {
        self.moves_vetoed.fetch_add(1, Ordering::Relaxed);
        self.moves_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_server_switch(&self) {
        self.server_switches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_zone_resolved(&self) {
        self.zones_resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, hosted_zones: usize, managers: usize) -> ZoneRegistryStats {
        ZoneRegistryStats {
            moves_requested: self.moves_requested.load(Ordering::Relaxed),
            moves_succeeded: self.moves_succeeded.load(Ordering::Relaxed),
            moves_failed: self.moves_failed.load(Ordering::Relaxed),
            moves_vetoed: self.moves_vetoed.load(Ordering::Relaxed),
            server_switches: self.server_switches.load(Ordering::Relaxed),
            zones_resolved: self.zones_resolved.load(Ordering::Relaxed),
            hosted_zones,
            managers,
        }
    }
}

/// Point-in-time copy of a zone registry's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRegistryStats {
    pub moves_requested: u64,
    pub moves_succeeded: u64,
    pub moves_failed: u64,
    pub moves_vetoed: u64,
    pub server_switches: u64,
    /// Fresh zone resolutions performed by this node
    pub zones_resolved: u64,
    /// Zones currently resolved on this node
    pub hosted_zones: usize,
    /// Registered zone managers
    pub managers: usize,
}
