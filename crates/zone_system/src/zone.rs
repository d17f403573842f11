//! # Zone Managers and Zone Resolution
//!
//! Zones group scenes and are resolved (brought into memory) independently of
//! them. Each zone type is owned by one [`ZoneManager`] implementation, which
//! knows how to build a zone's runtime state and decides who may enter or
//! leave it.
//!
//! ## Resolution lifecycle
//!
//! ```text
//! Unresolved ──resolve──▶ Resolving ──ok──▶ Resolved ──unhost──▶ Unhosted
//!      ▲                      │                                      │
//!      └──────── error ───────┘                 resolve ◀────────────┘
//! ```
//!
//! The [`ZoneResolutionTable`] drives this lifecycle. Concurrent requests for
//! a zone that is already resolving wait for the in-flight resolution instead
//! of starting another one. Resolution runs on its own task, so a caller that
//! stops waiting does not cancel it; the result is kept for later callers.

use crate::body::ZonedBody;
use crate::error::ZoneError;
use crate::types::{SceneId, ZoneId};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Lightweight public descriptor of a resolved zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneSummary {
    pub zone_id: ZoneId,
    pub name: String,
    /// Scene a body lands in when no scene is requested
    pub default_scene_id: SceneId,
}

/// Contract implemented once per zone type.
///
/// The zone registry never calls [`ZoneManager::resolve_zone`] twice
/// concurrently for the same zone id, and calls it again only after a failed
/// resolution or after the zone was shut down.
#[async_trait]
pub trait ZoneManager: Send + Sync {
    /// Builds the runtime state of a zone.
    async fn resolve_zone(&self, zone_id: ZoneId) -> Result<ZoneSummary, ZoneError>;

    /// Returns a veto reason if the body may not leave its current zone.
    fn ratify_body_exit(&self, body: &ZonedBody) -> Option<String>;

    /// Returns a veto reason if the body may not enter `zone_id`.
    fn ratify_body_entry(&self, body: &ZonedBody, zone_id: ZoneId) -> Option<String>;

    /// Called when a move whose entry was ratified fails before the body
    /// gets into `zone_id`. Anything reserved by `ratify_body_entry` should be
    /// given back here.
    fn body_entry_cancelled(&self, _body: &ZonedBody, _zone_id: ZoneId) {}

    /// Called once a body has been moved into `zone_id`.
    fn body_did_enter_zone(&self, body: &ZonedBody, zone_id: ZoneId);

    /// Called once a body has left `zone_id`, either for another zone or for none.
    fn body_did_leave_zone(&self, _body: &ZonedBody, _zone_id: ZoneId) {}

    /// Called after a zone this manager resolved stops being hosted.
    fn zone_did_shutdown(&self, _zone_id: ZoneId) {}
}

// ============================================================================
// Resolution table
// ============================================================================

/// Observable resolution state of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneState {
    Unresolved,
    Resolving,
    Resolved,
    Unhosted,
}

/// Outcome of a successful resolution request.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub summary: ZoneSummary,
    /// True for the request that triggered the resolution work
    pub fresh: bool,
}

type Waiter = oneshot::Sender<Result<ZoneSummary, String>>;

#[derive(Debug)]
enum Slot {
    Resolving(Vec<Waiter>),
    Resolved(ZoneSummary),
    Unhosted,
}

/// Coalescing table of zone resolutions.
#[derive(Debug, Clone, Default)]
pub struct ZoneResolutionTable {
    slots: Arc<DashMap<ZoneId, Slot>>,
}

impl ZoneResolutionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves a zone, running `load` only if no resolution is cached or in flight.
    ///
    /// `load` runs on a spawned task. Its error is logged there; callers
    /// receive [`ZoneError::ResolutionFailed`] carrying the error text.
    pub async fn resolve<F, Fut>(&self, zone_id: ZoneId, load: F) -> Result<Resolution, ZoneError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<ZoneSummary, ZoneError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let fresh = match self.slots.entry(zone_id) {
            Entry::Occupied(mut entry) => match entry.get_mut() {
                Slot::Resolved(summary) => {
                    return Ok(Resolution {
                        summary: summary.clone(),
                        fresh: false,
                    });
                }
                Slot::Resolving(waiters) => {
                    debug!("⏳ Zone {} already resolving, joining {} waiters", zone_id, waiters.len());
                    waiters.push(tx);
                    false
                }
                Slot::Unhosted => {
                    entry.insert(Slot::Resolving(vec![tx]));
                    true
                }
            },
            Entry::Vacant(entry) => {
                entry.insert(Slot::Resolving(vec![tx]));
                true
            }
        };

        if fresh {
            let mut guard = CompletionGuard {
                slots: self.slots.clone(),
                zone_id,
                completed: false,
            };
            tokio::spawn(async move {
                let result = load().await;
                guard.complete(result);
            });
        }

        match rx.await {
            Ok(Ok(summary)) => Ok(Resolution { summary, fresh }),
            Ok(Err(reason)) => Err(ZoneError::ResolutionFailed(reason)),
            Err(_) => Err(ZoneError::ResolutionFailed(format!(
                "resolution of zone {zone_id} was abandoned"
            ))),
        }
    }

    /// Marks a resolved zone as no longer hosted.
    ///
    /// Returns false if the zone was not resolved.
    pub fn unhost(&self, zone_id: ZoneId) -> bool {
        match self.slots.get_mut(&zone_id) {
            Some(mut slot) if matches!(*slot, Slot::Resolved(_)) => {
                *slot = Slot::Unhosted;
                true
            }
            _ => false,
        }
    }

    pub fn state(&self, zone_id: ZoneId) -> ZoneState {
        match self.slots.get(&zone_id).as_deref() {
            None => ZoneState::Unresolved,
            Some(Slot::Resolving(_)) => ZoneState::Resolving,
            Some(Slot::Resolved(_)) => ZoneState::Resolved,
            Some(Slot::Unhosted) => ZoneState::Unhosted,
        }
    }

    /// Summary of a resolved zone.
    pub fn summary(&self, zone_id: ZoneId) -> Option<ZoneSummary> {
        match self.slots.get(&zone_id).as_deref() {
            Some(Slot::Resolved(summary)) => Some(summary.clone()),
            _ => None,
        }
    }

    /// Ids of all currently resolved zones.
    pub fn resolved_zones(&self) -> Vec<ZoneId> {
        self.slots
            .iter()
            .filter(|slot| matches!(slot.value(), Slot::Resolved(_)))
            .map(|slot| *slot.key())
            .collect()
    }
}

/// Publishes a resolution result to every waiter.
///
/// If the resolving task dies before completing, dropping the guard clears the
/// slot so the zone can be resolved again.
struct CompletionGuard {
    slots: Arc<DashMap<ZoneId, Slot>>,
    zone_id: ZoneId,
    completed: bool,
}

impl CompletionGuard {
    fn complete(&mut self, result: Result<ZoneSummary, ZoneError>) {
        self.completed = true;

        let waiters = match &result {
            Ok(summary) => self
                .slots
                .insert(self.zone_id, Slot::Resolved(summary.clone())),
            Err(e) => {
                warn!("❌ Failed to resolve zone {}: {}", self.zone_id, e);
                self.slots.remove(&self.zone_id).map(|(_, slot)| slot)
            }
        };

        let Some(Slot::Resolving(waiters)) = waiters else {
            return;
        };
        let outcome = result.map_err(|e| e.to_string());
        for waiter in waiters {
            // A waiter that gave up has dropped its receiver.
            let _ = waiter.send(outcome.clone());
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if !self.completed {
            warn!("⚠️ Resolution task for zone {} ended without a result", self.zone_id);
            self.slots
                .remove_if(&self.zone_id, |_, slot| matches!(slot, Slot::Resolving(_)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ZoneType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn zone(local: i32) -> ZoneId {
        ZoneId::qualify(ZoneType::new(1).unwrap(), local)
    }

    fn summary(zone_id: ZoneId) -> ZoneSummary {
        ZoneSummary {
            zone_id,
            name: format!("zone {zone_id}"),
            default_scene_id: SceneId(1),
        }
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_resolution() {
        let table = ZoneResolutionTable::new();
        let loads = Arc::new(AtomicUsize::new(0));
        let zone_id = zone(1);

        let make_load = |loads: Arc<AtomicUsize>| {
            move || async move {
                loads.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(summary(zone_id))
            }
        };

        let (a, b) = tokio::join!(
            table.resolve(zone_id, make_load(loads.clone())),
            table.resolve(zone_id, make_load(loads.clone()))
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(a.summary, b.summary);
        assert!(a.fresh ^ b.fresh);
        assert_eq!(table.state(zone_id), ZoneState::Resolved);
    }

    #[tokio::test]
    async fn test_resolved_zone_is_served_from_cache() {
        let table = ZoneResolutionTable::new();
        let zone_id = zone(2);
        table
            .resolve(zone_id, move || async move { Ok(summary(zone_id)) })
            .await
            .unwrap();

        let again = table
            .resolve(zone_id, move || async move {
                Err(ZoneError::Internal("must not run".into()))
            })
            .await
            .unwrap();
        assert!(!again.fresh);
    }

    #[tokio::test]
    async fn test_failure_notifies_all_waiters_and_is_not_cached() {
        let table = ZoneResolutionTable::new();
        let zone_id = zone(3);

        let failing = move || async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err::<ZoneSummary, _>(ZoneError::Internal("storage offline".into()))
        };
        let (a, b) = tokio::join!(table.resolve(zone_id, failing), table.resolve(zone_id, failing));
        assert!(matches!(a, Err(ZoneError::ResolutionFailed(ref r)) if r.contains("storage offline")));
        assert!(matches!(b, Err(ZoneError::ResolutionFailed(_))));
        assert_eq!(table.state(zone_id), ZoneState::Unresolved);

        let ok = table
            .resolve(zone_id, move || async move { Ok(summary(zone_id)) })
            .await
            .unwrap();
        assert!(ok.fresh);
    }

    #[tokio::test]
    async fn test_abandoned_wait_does_not_cancel_resolution() {
        let table = ZoneResolutionTable::new();
        let zone_id = zone(4);

        let slow = move || async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(summary(zone_id))
        };
        let waited = tokio::time::timeout(Duration::from_millis(5), table.resolve(zone_id, slow)).await;
        assert!(waited.is_err());
        assert_eq!(table.state(zone_id), ZoneState::Resolving);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(table.state(zone_id), ZoneState::Resolved);
        assert_eq!(table.summary(zone_id), Some(summary(zone_id)));
    }

    #[tokio::test]
    async fn test_unhost_lifecycle() {
        let table = ZoneResolutionTable::new();
        let zone_id = zone(5);
        assert!(!table.unhost(zone_id));

        table
            .resolve(zone_id, move || async move { Ok(summary(zone_id)) })
            .await
            .unwrap();
        assert_eq!(table.resolved_zones(), vec![zone_id]);

        assert!(table.unhost(zone_id));
        assert_eq!(table.state(zone_id), ZoneState::Unhosted);
        assert!(table.summary(zone_id).is_none());

        let again = table
            .resolve(zone_id, move || async move { Ok(summary(zone_id)) })
            .await
            .unwrap();
        assert!(again.fresh);
    }
}
