//! Config-driven zone and location managers.
//!
//! The server hosts the zones declared in its configuration. One
//! [`StaticZoneManager`] serves each configured zone type and enforces zone
//! capacity by vetoing entry; [`ServerLocationManager`] keeps track of which
//! place each body occupies.
//!
//! Ratifying an entry into a capped zone reserves a slot. The slot turns into
//! occupancy when the body arrives and is given back if the move fails.

use crate::config::ZoneDefinition;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use tracing::{debug, info};
use zone_system::{
    BodyId, LocationManager, PlaceConfig, PlaceOid, ZoneError, ZoneId, ZoneManager, ZoneSummary,
    ZoneType, ZonedBody,
};

/// Veto reason given when a zone is at capacity.
pub const ZONE_FULL: &str = "e.zone_full";

// ============================================================================
// Zone manager
// ============================================================================

/// Bodies inside a zone plus bodies on their way in.
#[derive(Debug, Default, Clone, Copy)]
struct Headcount {
    present: usize,
    reserved: usize,
}

/// Zone manager for the configured zones of one zone type.
#[derive(Debug)]
pub struct StaticZoneManager {
    zone_type: ZoneType,
    zones: HashMap<ZoneId, ZoneDefinition>,
    occupancy: DashMap<ZoneId, Headcount>,
}

impl StaticZoneManager {
    /// Creates a manager for the definitions of `zone_type`; others are ignored.
    pub fn new(zone_type: ZoneType, definitions: &[ZoneDefinition]) -> Self {
        let zones = definitions
            .iter()
            .filter_map(|def| def.zone_id().map(|zone_id| (zone_id, def.clone())))
            .filter(|(zone_id, _)| zone_id.zone_type() == Some(zone_type))
            .collect();
        Self {
            zone_type,
            zones,
            occupancy: DashMap::new(),
        }
    }

    pub fn zone_type(&self) -> ZoneType {
        self.zone_type
    }

    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    /// Number of bodies currently in a zone.
    pub fn occupancy(&self, zone_id: ZoneId) -> usize {
        self.occupancy
            .get(&zone_id)
            .map(|count| count.present)
            .unwrap_or(0)
    }

    /// Number of ratified entries that have not arrived yet.
    pub fn reserved(&self, zone_id: ZoneId) -> usize {
        self.occupancy
            .get(&zone_id)
            .map(|count| count.reserved)
            .unwrap_or(0)
    }

    fn capacity(&self, zone_id: ZoneId) -> Option<usize> {
        self.zones.get(&zone_id).and_then(|def| def.capacity)
    }

    fn prune(&self, zone_id: ZoneId) {
        self.occupancy
            .remove_if(&zone_id, |_, count| count.present == 0 && count.reserved == 0);
    }
}

#[async_trait]
impl ZoneManager for StaticZoneManager {
    async fn resolve_zone(&self, zone_id: ZoneId) -> Result<ZoneSummary, ZoneError> {
        let def = self.zones.get(&zone_id).ok_or_else(|| {
            ZoneError::ResolutionFailed(format!("zone {zone_id} is not configured on this node"))
        })?;
        Ok(ZoneSummary {
            zone_id,
            name: def.name.clone(),
            default_scene_id: def.default_scene_id(),
        })
    }

    fn ratify_body_exit(&self, _body: &ZonedBody) -> Option<String> {
        None
    }

    fn ratify_body_entry(&self, body: &ZonedBody, zone_id: ZoneId) -> Option<String> {
        let capacity = self.capacity(zone_id)?;
        let mut count = self.occupancy.entry(zone_id).or_default();
        if count.present + count.reserved >= capacity {
            debug!("🚧 Zone {} is full, refusing body {}", zone_id, body.body_id());
            return Some(ZONE_FULL.to_string());
        }
        count.reserved += 1;
        None
    }

    fn body_entry_cancelled(&self, body: &ZonedBody, zone_id: ZoneId) {
        if self.capacity(zone_id).is_none() {
            return;
        }
        if let Some(mut count) = self.occupancy.get_mut(&zone_id) {
            count.reserved = count.reserved.saturating_sub(1);
        }
        self.prune(zone_id);
        debug!("↩️ Released slot in zone {} held for body {}", zone_id, body.body_id());
    }

    fn body_did_enter_zone(&self, _body: &ZonedBody, zone_id: ZoneId) {
        let capped = self.capacity(zone_id).is_some();
        let mut count = self.occupancy.entry(zone_id).or_default();
        if capped {
            count.reserved = count.reserved.saturating_sub(1);
        }
        count.present += 1;
    }

    fn body_did_leave_zone(&self, _body: &ZonedBody, zone_id: ZoneId) {
        if let Some(mut count) = self.occupancy.get_mut(&zone_id) {
            count.present = count.present.saturating_sub(1);
        }
        self.prune(zone_id);
    }

    fn zone_did_shutdown(&self, zone_id: ZoneId) {
        info!(
            "📴 Zone {} shut down with {} bodies inside",
            zone_id,
            self.occupancy(zone_id)
        );
    }
}

// ============================================================================
// Location manager
// ============================================================================

/// Tracks the place each body occupies on this node.
#[derive(Debug, Default)]
pub struct ServerLocationManager {
    placements: DashMap<BodyId, PlaceOid>,
}

impl ServerLocationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn place_of(&self, body_id: BodyId) -> Option<PlaceOid> {
        self.placements.get(&body_id).map(|place| *place)
    }

    /// Number of bodies in a place.
    pub fn occupants(&self, place_oid: PlaceOid) -> usize {
        self.placements.iter().filter(|entry| *entry.value() == place_oid).count()
    }
}

#[async_trait]
impl LocationManager for ServerLocationManager {
    async fn commit_move(
        &self,
        body: &ZonedBody,
        place_oid: PlaceOid,
        place_config: &PlaceConfig,
    ) -> Result<(), ZoneError> {
        if !body.is_connected() {
            return Err(ZoneError::LocationCommit(format!(
                "body {} is no longer connected",
                body.body_id()
            )));
        }
        self.placements.insert(body.body_id(), place_oid);
        debug!(
            "📍 Body {} placed in {} ({})",
            body.body_id(),
            place_oid,
            place_config.place_type
        );
        Ok(())
    }

    async fn leave_place(&self, body: &ZonedBody) {
        self.placements.remove(&body.body_id());
    }
}
