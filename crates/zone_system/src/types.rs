//! # Core Type Definitions
//!
//! Identifiers shared by every part of the zone system. Wrapper types keep
//! zone ids, scene ids and place oids from being confused with one another.
//!
//! ## Key Types
//!
//! - [`ZoneId`] - Qualified zone identifier carrying a [`ZoneType`] tag in its high bits
//! - [`ZoneType`] - 7-bit tag selecting the zone manager responsible for a zone
//! - [`SceneId`] - Identifier of a versioned scene
//! - [`PlaceOid`] - Identifier of the live place object a body is moved into
//! - [`BodyId`] - Unique identifier for a connected body (player session)
//! - [`NodeName`] - Name of a cluster node

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Zone identifiers
// ============================================================================

/// Number of bits reserved for the local part of a qualified zone id.
pub const ZONE_TYPE_SHIFT: u32 = 24;

/// Mask selecting the local part of a qualified zone id.
pub const LOCAL_ZONE_MASK: i32 = 0x00FF_FFFF;

/// A 7-bit zone type tag.
///
/// Zone types partition the zone id space among zone managers. Valid tags
/// lie in `1..=127`; zero is never a valid type and the eighth bit is kept
/// clear so qualified ids are always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZoneType(u8);

impl ZoneType {
    /// Largest valid zone type tag.
    pub const MAX: u8 = 127;

    /// Creates a zone type, returning `None` if the tag is outside `1..=127`.
    pub fn new(tag: u8) -> Option<Self> {
        if tag == 0 || tag > Self::MAX {
            None
        } else {
            Some(Self(tag))
        }
    }

    /// Returns the raw tag value.
    pub fn get(self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for ZoneType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Qualified identifier of a zone.
///
/// The zone type lives in bits 24..31 and the manager-local id in the low
/// 24 bits:
///
/// ```rust
/// use zone_system::{ZoneId, ZoneType};
///
/// let zone_type = ZoneType::new(3).unwrap();
/// let zone_id = ZoneId::qualify(zone_type, 42);
/// assert_eq!(zone_id.zone_type(), Some(zone_type));
/// assert_eq!(zone_id.local_id(), 42);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub i32);

impl ZoneId {
    /// Combines a zone type and a manager-local id into a qualified id.
    ///
    /// Only the low 24 bits of `local_id` are kept.
    pub fn qualify(zone_type: ZoneType, local_id: i32) -> Self {
        Self(((zone_type.get() as i32) << ZONE_TYPE_SHIFT) | (local_id & LOCAL_ZONE_MASK))
    }

    /// Extracts the zone type tag, or `None` if the id carries no valid tag.
    pub fn zone_type(self) -> Option<ZoneType> {
        if self.0 < 0 {
            return None;
        }
        ZoneType::new((self.0 >> ZONE_TYPE_SHIFT) as u8)
    }

    /// Extracts the manager-local part of the id.
    pub fn local_id(self) -> i32 {
        self.0 & LOCAL_ZONE_MASK
    }
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.zone_type() {
            Some(zone_type) => write!(f, "{}:{}", zone_type, self.local_id()),
            None => write!(f, "?{}", self.0),
        }
    }
}

// ============================================================================
// Scene and place identifiers
// ============================================================================

/// Identifier of a versioned scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneId(pub i32);

impl std::fmt::Display for SceneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Object id of the live place a scene is hosted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceOid(pub i32);

impl std::fmt::Display for PlaceOid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Bodies and nodes
// ============================================================================

/// Unique identifier for a connected body.
///
/// A wrapper around UUID so body ids cannot be confused with other ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BodyId(pub Uuid);

impl BodyId {
    /// Creates a new random body id using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BodyId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BodyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a node in the server cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeName(pub String);

impl NodeName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
