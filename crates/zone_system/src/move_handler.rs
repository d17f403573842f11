//! # Zone Move Handler
//!
//! A [`ZoneMoveHandler`] drives one body from its current zone and scene to
//! a requested zone and scene. It lives for a single request and walks a
//! fixed sequence of states:
//!
//! ```text
//! Start → ExitRatified → ZoneResolving → ZoneResolved → EntryRatified
//!       → SceneResolving → Completed
//! ```
//!
//! `Failed` is reachable from every state. Nothing observable changes before
//! the location commit, so a request that fails earlier leaves the body where
//! it was.
//!
//! Resolution suspends the handler. Other requests may run in the meantime,
//! so the handler checks that the body is still connected and the zone still
//! resolved before committing. Requests for the same body wait on its move
//! lock and run one after another.
//!
//! A move within the body's current zone skips both ratifications and zone
//! resolution when the zone is still resolved here; it becomes a scene move.

use crate::body::ZonedBody;
use crate::error::ZoneError;
use crate::peer::NodeInfo;
use crate::registry::{ZoneLocation, ZoneRegistry};
use crate::scene::{PlaceConfig, SceneModel};
use crate::types::{NodeName, PlaceOid, SceneId, ZoneId};
use crate::update::SceneUpdate;
use crate::zone::{ZoneManager, ZoneState, ZoneSummary};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// A client's request to move into a zone and scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub zone_id: ZoneId,
    pub scene_id: SceneId,
    /// Version of the scene the client has cached
    pub scene_version: i32,
}

/// States a move request passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveState {
    Start,
    ExitRatified,
    ZoneResolving,
    ZoneResolved,
    EntryRatified,
    SceneResolving,
    Completed,
    Failed,
}

/// Response to a move request.
#[derive(Debug, Clone)]
pub enum MoveResult {
    /// The zone is hosted by another node; the client must reconnect there
    RequiresServerSwitch {
        node: NodeName,
        host: String,
        port: u16,
    },
    /// The client's cached scene is current
    Succeeded {
        place_oid: PlaceOid,
        place_config: PlaceConfig,
        summary: ZoneSummary,
    },
    /// The client's cached scene cannot be brought up to date with deltas
    SucceededWithScene {
        place_oid: PlaceOid,
        place_config: PlaceConfig,
        summary: ZoneSummary,
        model: SceneModel,
    },
    /// The client can bring its cached scene up to date with these deltas
    SucceededWithUpdates {
        place_oid: PlaceOid,
        place_config: PlaceConfig,
        summary: ZoneSummary,
        updates: Vec<SceneUpdate>,
    },
    Failed {
        reason: String,
    },
}

impl MoveResult {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            MoveResult::Succeeded { .. }
                | MoveResult::SucceededWithScene { .. }
                | MoveResult::SucceededWithUpdates { .. }
        )
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            MoveResult::Failed { reason } => Some(reason),
            _ => None,
        }
    }

    fn server_switch(node: NodeInfo) -> Self {
        MoveResult::RequiresServerSwitch {
            node: node.name,
            host: node.public_host,
            port: node.port,
        }
    }
}

/// What the handler does once the response is queued.
struct Completion {
    result: MoveResult,
    /// Manager to notify that the body entered the zone
    entered: Option<Arc<dyn ZoneManager>>,
    /// Zone the body left, with its manager
    left: Option<(Arc<dyn ZoneManager>, ZoneId)>,
}

/// Per-request state machine for a single zone move.
pub struct ZoneMoveHandler<'a> {
    registry: &'a ZoneRegistry,
    body: &'a ZonedBody,
    request: MoveRequest,
    state: MoveState,
}

impl<'a> ZoneMoveHandler<'a> {
    pub fn new(registry: &'a ZoneRegistry, body: &'a ZonedBody, request: MoveRequest) -> Self {
        Self {
            registry,
            body,
            request,
            state: MoveState::Start,
        }
    }

    pub fn state(&self) -> MoveState {
        self.state
    }

    /// Runs the move to completion and sends exactly one result on `reply`.
    ///
    /// The entered zone's manager is notified after the result is sent.
    pub async fn run(mut self, reply: oneshot::Sender<MoveResult>) -> MoveState {
        let body = self.body;
        let _moving = body.lock_moves().await;

        let registry = self.registry;
        let stats = registry.move_stats();
        stats.record_requested();

        let completion = match self.execute().await {
            Ok(completion) => completion,
            Err(e) => {
                let reason = e.reason_code().into_owned();
                self.fail(&e);
                let _ = reply.send(MoveResult::Failed { reason });
                return self.state;
            }
        };

        match &completion.result {
            MoveResult::RequiresServerSwitch { node, .. } => {
                stats.record_server_switch();
                info!(
                    "🔀 Body {} must switch to node '{}' to reach zone {}",
                    self.body.body_id(),
                    node,
                    self.request.zone_id
                );
            }
            _ => stats.record_succeeded(),
        }

        if reply.send(completion.result).is_err() {
            debug!("Move requester for body {} went away", self.body.body_id());
        }

        if let Some((manager, zone_id)) = completion.left {
            manager.body_did_leave_zone(self.body, zone_id);
        }
        if let Some(manager) = completion.entered {
            manager.body_did_enter_zone(self.body, self.request.zone_id);
        }
        self.state
    }

    fn transition(&mut self, next: MoveState) {
        debug!(
            "🧭 Move of body {} to {}: {:?} -> {:?}",
            self.body.body_id(),
            self.request.zone_id,
            self.state,
            next
        );
        self.state = next;
    }

    fn fail(&mut self, e: &ZoneError) {
        let registry = self.registry;
        let stats = registry.move_stats();
        match e {
            ZoneError::Veto(reason) => {
                stats.record_vetoed();
                info!(
                    "🚫 Move of body {} to {} vetoed in {:?}: {}",
                    self.body.body_id(),
                    self.request.zone_id,
                    self.state,
                    reason
                );
            }
            ZoneError::NoSuchZone(_) | ZoneError::InvalidZoneType(_) | ZoneError::Disconnected => {
                stats.record_failed();
                warn!(
                    "⚠️ Move of body {} to {} failed: {}",
                    self.body.body_id(),
                    self.request.zone_id,
                    e
                );
            }
            _ => {
                stats.record_failed();
                error!(
                    "❌ Move of body {} to {} failed in {:?}: {}",
                    self.body.body_id(),
                    self.request.zone_id,
                    self.state,
                    e
                );
            }
        }
        self.transition(MoveState::Failed);
    }

    async fn execute(&mut self) -> Result<Completion, ZoneError> {
        let MoveRequest { zone_id, scene_id, .. } = self.request;

        if self.registry.shutdown_state().is_shutdown_initiated() {
            return Err(ZoneError::Internal("registry is shutting down".into()));
        }

        let previous_zone = self.body.zone_id();
        let same_zone = previous_zone == Some(zone_id);

        if !same_zone {
            if let Some(current) = previous_zone.and_then(|z| self.registry.manager_for(z)) {
                if let Some(reason) = current.ratify_body_exit(self.body) {
                    return Err(ZoneError::Veto(reason));
                }
            }
        }
        self.transition(MoveState::ExitRatified);

        let cached = if same_zone {
            self.registry.zone_summary(zone_id)
        } else {
            None
        };
        let (summary, entering) = match cached {
            Some(summary) => {
                debug!(
                    "🔁 Body {} stays in zone {}, moving to scene {}",
                    self.body.body_id(),
                    zone_id,
                    scene_id
                );
                self.transition(MoveState::ZoneResolved);
                (summary, None)
            }
            None => {
                let zone_type = zone_id
                    .zone_type()
                    .ok_or(ZoneError::InvalidZoneType(zone_id))?;
                let manager = self
                    .registry
                    .manager(zone_type)
                    .ok_or(ZoneError::NoSuchZone(zone_id))?;

                self.transition(MoveState::ZoneResolving);
                let summary = match self.registry.locate_zone(zone_id, manager.clone()).await? {
                    ZoneLocation::Local(summary) => summary,
                    ZoneLocation::Remote(node) => {
                        self.transition(MoveState::Completed);
                        return Ok(Completion {
                            result: MoveResult::server_switch(node),
                            entered: None,
                            left: None,
                        });
                    }
                };
                self.transition(MoveState::ZoneResolved);
                (summary, (!same_zone).then_some(manager))
            }
        };

        if let Some(manager) = &entering {
            if let Some(reason) = manager.ratify_body_entry(self.body, zone_id) {
                return Err(ZoneError::Veto(reason));
            }
        }
        self.transition(MoveState::EntryRatified);

        let result = match self.enter_scene(previous_zone, summary).await {
            Ok(result) => result,
            Err(e) => {
                if let Some(manager) = &entering {
                    manager.body_entry_cancelled(self.body, zone_id);
                }
                return Err(e);
            }
        };

        let left = if same_zone {
            None
        } else {
            previous_zone.and_then(|previous| {
                self.registry
                    .manager_for(previous)
                    .map(|manager| (manager, previous))
            })
        };

        Ok(Completion {
            result,
            entered: entering,
            left,
        })
    }

    /// Resolves the scene, commits the body's new place and builds the reply.
    async fn enter_scene(
        &mut self,
        previous_zone: Option<ZoneId>,
        summary: ZoneSummary,
    ) -> Result<MoveResult, ZoneError> {
        let MoveRequest {
            zone_id,
            scene_id,
            scene_version,
        } = self.request;
        let same_zone = previous_zone == Some(zone_id);

        self.transition(MoveState::SceneResolving);
        let scene = tokio::time::timeout(
            self.registry.config().resolution_timeout,
            self.registry.scenes().resolve_scene(scene_id),
        )
        .await
        .map_err(|_| ZoneError::ResolutionTimeout {
            what: format!("scene {scene_id}"),
        })??;

        if !self.body.is_connected() {
            return Err(ZoneError::Disconnected);
        }
        if self.registry.zone_state(zone_id) != ZoneState::Resolved {
            return Err(ZoneError::ResolutionFailed(format!(
                "zone {zone_id} stopped being hosted during the move"
            )));
        }

        if !same_zone {
            self.body.clear_zone_id();
        }
        let committed = self
            .registry
            .locations()
            .commit_move(self.body, scene.place_oid(), scene.place_config())
            .await;
        if let Err(e) = committed {
            match previous_zone {
                Some(previous) => self.body.set_zone_id(previous),
                None => self.body.clear_zone_id(),
            }
            return Err(e);
        }
        self.body.set_zone_id(zone_id);

        let (model, deltas) = scene.sync_state(scene_version).await;
        let place_oid = scene.place_oid();
        let place_config = scene.place_config().clone();

        let result = if scene_version == model.version {
            MoveResult::Succeeded {
                place_oid,
                place_config,
                summary,
            }
        } else if let Some(updates) = deltas {
            debug!(
                "📦 Sending {} updates to bring scene {} from v{} to v{}",
                updates.len(),
                scene_id,
                scene_version,
                model.version
            );
            MoveResult::SucceededWithUpdates {
                place_oid,
                place_config,
                summary,
                updates,
            }
        } else {
            MoveResult::SucceededWithScene {
                place_oid,
                place_config,
                summary,
                model,
            }
        };

        self.transition(MoveState::Completed);
        info!(
            "✅ Body {} moved to zone {} scene {} (place {})",
            self.body.body_id(),
            zone_id,
            scene_id,
            place_oid
        );
        Ok(result)
    }
}
