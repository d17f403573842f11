//! Per-session body state tracked by the zone system.
//!
//! A [`ZonedBody`] records which zone a connected body occupies. The zone id
//! is cleared when the body leaves its zone and set exactly once per completed
//! move. The connected flag lets in-flight move handlers notice a disconnect
//! before they commit anything.
//!
//! Moves and leaves of one body run one at a time under its move lock.

use crate::types::{BodyId, ZoneId};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use tokio::sync::{Mutex, MutexGuard};

const NO_ZONE: i32 = -1;

/// Zone occupancy state for one connected body.
#[derive(Debug)]
pub struct ZonedBody {
    body_id: BodyId,
    username: String,
    zone_id: AtomicI32,
    connected: AtomicBool,
    move_lock: Mutex<()>,
}

impl ZonedBody {
    /// Creates a connected body that occupies no zone.
    pub fn new(body_id: BodyId, username: impl Into<String>) -> Self {
        Self {
            body_id,
            username: username.into(),
            zone_id: AtomicI32::new(NO_ZONE),
            connected: AtomicBool::new(true),
            move_lock: Mutex::new(()),
        }
    }

    pub fn body_id(&self) -> BodyId {
        self.body_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// The zone the body currently occupies, if any.
    pub fn zone_id(&self) -> Option<ZoneId> {
        match self.zone_id.load(Ordering::Acquire) {
            NO_ZONE => None,
            raw => Some(ZoneId(raw)),
        }
    }

    pub fn set_zone_id(&self, zone_id: ZoneId) {
        self.zone_id.store(zone_id.0, Ordering::Release);
    }

    /// Marks the body as occupying no zone.
    pub fn clear_zone_id(&self) {
        self.zone_id.store(NO_ZONE, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Marks the body as disconnected; pending moves will abort.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
    }

    /// Waits for any other move of this body to finish.
    ///
    /// The guard must be held from the first read of the zone id until the
    /// zone managers have been notified.
    pub async fn lock_moves(&self) -> MutexGuard<'_, ()> {
        self.move_lock.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_id_lifecycle() {
        let body = ZonedBody::new(BodyId::new(), "alice");
        assert_eq!(body.zone_id(), None);

        body.set_zone_id(ZoneId(0x0100_0002));
        assert_eq!(body.zone_id(), Some(ZoneId(0x0100_0002)));

        body.clear_zone_id();
        assert_eq!(body.zone_id(), None);
    }

    #[tokio::test]
    async fn test_move_lock_is_exclusive() {
        let body = ZonedBody::new(BodyId::new(), "carol");
        let guard = body.lock_moves().await;
        assert!(body.move_lock.try_lock().is_err());
        drop(guard);
        assert!(body.move_lock.try_lock().is_ok());
    }

    #[test]
    fn test_disconnect() {
        let body = ZonedBody::new(BodyId::new(), "bob");
        assert!(body.is_connected());
        body.disconnect();
        assert!(!body.is_connected());
    }
}
