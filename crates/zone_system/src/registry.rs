//! # Zone Registry
//!
//! The process-scoped entry point for zone travel. A [`ZoneRegistry`] owns:
//!
//! - the zone managers, one per [`ZoneType`]
//! - the [`ZoneResolutionTable`] of zones resolved on this node
//! - the [`SceneRegistry`] used to resolve target scenes
//! - the [`LocationManager`] that commits bodies to places
//! - optionally a [`ZonePeerManager`] connecting this node to the cluster
//!
//! Each call to [`ZoneRegistry::move_to`] runs a fresh [`ZoneMoveHandler`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zone_system::*;
//!
//! # async fn example(
//! #     locations: Arc<dyn LocationManager>,
//! #     manager: Arc<dyn ZoneManager>,
//! # ) -> Result<(), ZoneError> {
//! let store = Arc::new(MemorySceneStore::new());
//! let scenes = Arc::new(SceneRegistry::new(store, UpdateCodec::default()));
//! let registry = ZoneRegistry::new(scenes, locations, MovementConfig::default());
//!
//! let zone_type = ZoneType::new(1).unwrap();
//! registry.register_zone_manager(zone_type, manager)?;
//!
//! let body = ZonedBody::new(BodyId::new(), "alice");
//! let result = registry
//!     .move_to(&body, ZoneId::qualify(zone_type, 7), SceneId(100), 0)
//!     .await;
//! println!("{result:?}");
//! # Ok(())
//! # }
//! ```

use crate::body::ZonedBody;
use crate::config::MovementConfig;
use crate::error::{ZoneError, INTERNAL_ERROR};
use crate::location::LocationManager;
use crate::move_handler::{MoveRequest, MoveResult, ZoneMoveHandler};
use crate::peer::{NodeInfo, ZoneClaim, ZonePeerManager};
use crate::scene::SceneRegistry;
use crate::shutdown::ShutdownState;
use crate::stats::{MoveStats, ZoneRegistryStats};
use crate::types::{SceneId, ZoneId, ZoneType};
use crate::zone::{ZoneManager, ZoneResolutionTable, ZoneState, ZoneSummary};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Where a zone can be entered.
#[derive(Debug, Clone)]
pub(crate) enum ZoneLocation {
    Local(ZoneSummary),
    Remote(NodeInfo),
}

/// Registry of zone managers and driver of zone moves.
pub struct ZoneRegistry {
    managers: DashMap<ZoneType, Arc<dyn ZoneManager>>,
    zones: ZoneResolutionTable,
    scenes: Arc<SceneRegistry>,
    locations: Arc<dyn LocationManager>,
    peers: Option<Arc<ZonePeerManager>>,
    config: MovementConfig,
    stats: Arc<MoveStats>,
    shutdown: ShutdownState,
}

impl ZoneRegistry {
    /// Creates a registry for a single node with no cluster directory.
    pub fn new(
        scenes: Arc<SceneRegistry>,
        locations: Arc<dyn LocationManager>,
        config: MovementConfig,
    ) -> Self {
        Self {
            managers: DashMap::new(),
            zones: ZoneResolutionTable::new(),
            scenes,
            locations,
            peers: None,
            config,
            stats: Arc::new(MoveStats::default()),
            shutdown: ShutdownState::new(),
        }
    }

    /// Connects the registry to the cluster zone directory.
    pub fn with_peers(mut self, peers: Arc<ZonePeerManager>) -> Self {
        self.peers = Some(peers);
        self
    }

    // ========================================================================
    // Manager registration
    // ========================================================================

    /// Registers the manager responsible for a zone type.
    ///
    /// # Errors
    ///
    /// Returns [`ZoneError::DuplicateZoneManager`] if the type already has one.
    pub fn register_zone_manager(
        &self,
        zone_type: ZoneType,
        manager: Arc<dyn ZoneManager>,
    ) -> Result<(), ZoneError> {
        match self.managers.entry(zone_type) {
            Entry::Occupied(_) => Err(ZoneError::DuplicateZoneManager(zone_type)),
            Entry::Vacant(entry) => {
                entry.insert(manager);
                info!("🗂️ Registered zone manager for zone type {}", zone_type);
                Ok(())
            }
        }
    }

    /// Removes the manager for a zone type.
    ///
    /// Zones it already resolved stay resolved until shut down.
    pub fn unregister_zone_manager(&self, zone_type: ZoneType) -> Option<Arc<dyn ZoneManager>> {
        let removed = self.managers.remove(&zone_type).map(|(_, manager)| manager);
        if removed.is_some() {
            info!("🗂️ Unregistered zone manager for zone type {}", zone_type);
        }
        removed
    }

    pub fn manager(&self, zone_type: ZoneType) -> Option<Arc<dyn ZoneManager>> {
        self.managers.get(&zone_type).map(|m| m.value().clone())
    }

    /// The manager responsible for a zone id, derived from its type bits.
    pub fn manager_for(&self, zone_id: ZoneId) -> Option<Arc<dyn ZoneManager>> {
        zone_id.zone_type().and_then(|zone_type| self.manager(zone_type))
    }

    // ========================================================================
    // Moves
    // ========================================================================

    /// Moves a body into a zone and scene.
    ///
    /// `scene_version` is the version of the scene the client has cached; it
    /// decides whether the result carries nothing, deltas or a full snapshot.
    pub async fn move_to(
        &self,
        body: &ZonedBody,
        zone_id: ZoneId,
        scene_id: SceneId,
        scene_version: i32,
    ) -> MoveResult {
        let request = MoveRequest {
            zone_id,
            scene_id,
            scene_version,
        };
        let (reply, response) = oneshot::channel();
        ZoneMoveHandler::new(self, body, request).run(reply).await;

        response.await.unwrap_or_else(|_| MoveResult::Failed {
            reason: INTERNAL_ERROR.to_string(),
        })
    }

    /// Takes the body out of its zone.
    pub async fn leave_occupied_zone(&self, body: &ZonedBody) {
        let _moving = body.lock_moves().await;
        if let Some(zone_id) = body.zone_id() {
            body.clear_zone_id();
            self.locations.leave_place(body).await;
            if let Some(manager) = self.manager_for(zone_id) {
                manager.body_did_leave_zone(body, zone_id);
            }
            debug!("🚪 Body {} left zone {}", body.body_id(), zone_id);
        }
    }

    /// Resolves a zone on this node, or finds the node that hosts it.
    pub(crate) async fn locate_zone(
        &self,
        zone_id: ZoneId,
        manager: Arc<dyn ZoneManager>,
    ) -> Result<ZoneLocation, ZoneError> {
        if let Some(peers) = &self.peers {
            if let Some((node, _)) = peers.get_zone_host(zone_id).await? {
                if !peers.is_local(&node.name) {
                    return Ok(ZoneLocation::Remote(node));
                }
            }
            if let ZoneClaim::HostedBy(node) = peers.claim_zone(zone_id).await? {
                return Ok(ZoneLocation::Remote(node));
            }
        }

        let peers = self.peers.clone();
        let stats = self.stats.clone();
        let load = move || async move {
            let result = manager.resolve_zone(zone_id).await;
            match (&result, &peers) {
                (Ok(summary), Some(peers)) => {
                    if let Err(e) = peers.zone_did_startup(zone_id, &summary.name).await {
                        warn!("⚠️ Failed to publish zone {}: {}", zone_id, e);
                    }
                }
                (Err(_), Some(peers)) => {
                    if let Err(e) = peers.release_zone(zone_id).await {
                        warn!("⚠️ Failed to release zone host lock for {}: {}", zone_id, e);
                    }
                }
                _ => {}
            }
            if let Ok(summary) = &result {
                stats.record_zone_resolved();
                info!("🗺️ Resolved zone {} '{}'", zone_id, summary.name);
            }
            result
        };

        let resolution = tokio::time::timeout(
            self.config.resolution_timeout,
            self.zones.resolve(zone_id, load),
        )
        .await
        .map_err(|_| ZoneError::ResolutionTimeout {
            what: format!("zone {zone_id}"),
        })??;

        Ok(ZoneLocation::Local(resolution.summary))
    }

    // ========================================================================
    // Zone lifecycle
    // ========================================================================

    /// Stops hosting a zone on this node.
    ///
    /// Returns false if the zone was not resolved here.
    pub async fn shutdown_zone(&self, zone_id: ZoneId) -> Result<bool, ZoneError> {
        if !self.zones.unhost(zone_id) {
            return Ok(false);
        }
        if let Some(manager) = self.manager_for(zone_id) {
            manager.zone_did_shutdown(zone_id);
        }
        if let Some(peers) = &self.peers {
            peers.zone_did_shutdown(zone_id).await?;
            peers.release_zone(zone_id).await?;
        }
        info!("📴 Zone {} shut down", zone_id);
        Ok(true)
    }

    /// Refuses new moves, shuts down every hosted zone and leaves the cluster.
    pub async fn shutdown(&self) -> Result<(), ZoneError> {
        self.shutdown.initiate_shutdown();
        for zone_id in self.zones.resolved_zones() {
            self.shutdown_zone(zone_id).await?;
        }
        if let Some(peers) = &self.peers {
            peers.leave().await?;
        }
        self.shutdown.complete_shutdown();
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn zone_state(&self, zone_id: ZoneId) -> ZoneState {
        self.zones.state(zone_id)
    }

    /// Summary of a zone resolved on this node.
    pub fn zone_summary(&self, zone_id: ZoneId) -> Option<ZoneSummary> {
        self.zones.summary(zone_id)
    }

    /// Summaries of the zones resolved on this node.
    pub fn hosted_zones(&self) -> Vec<ZoneSummary> {
        self.zones
            .resolved_zones()
            .into_iter()
            .filter_map(|zone_id| self.zones.summary(zone_id))
            .collect()
    }

    pub fn scenes(&self) -> &Arc<SceneRegistry> {
        &self.scenes
    }

    pub fn locations(&self) -> &Arc<dyn LocationManager> {
        &self.locations
    }

    pub fn peers(&self) -> Option<&Arc<ZonePeerManager>> {
        self.peers.as_ref()
    }

    pub fn config(&self) -> &MovementConfig {
        &self.config
    }

    pub fn shutdown_state(&self) -> &ShutdownState {
        &self.shutdown
    }

    pub fn stats(&self) -> ZoneRegistryStats {
        self.stats
            .snapshot(self.zones.resolved_zones().len(), self.managers.len())
    }

    pub(crate) fn move_stats(&self) -> &MoveStats {
        &self.stats
    }
}

impl std::fmt::Debug for ZoneRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoneRegistry")
            .field("managers", &self.managers.len())
            .field("zones", &self.zones)
            .field("scenes", &self.scenes)
            .field("peers", &self.peers)
            .field("config", &self.config)
            .finish()
    }
}
