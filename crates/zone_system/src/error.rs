//! Error types for zone travel, scene updates and peer hosting.
//!
//! Every failure a move request can hit maps onto one of a small set of
//! client-facing reason codes through [`ZoneError::reason_code`]. Veto
//! reasons are surfaced verbatim; everything else is collapsed so internal
//! causes never leak to clients.

use crate::types::{SceneId, ZoneId, ZoneType};
use std::borrow::Cow;

/// Reason code returned when no zone manager is registered for a zone type.
pub const NO_SUCH_ZONE: &str = "m.no_such_zone";

/// Reason code returned for any internal failure, including resolution failures.
pub const INTERNAL_ERROR: &str = "m.internal_error";

/// Errors raised by the zone system.
#[derive(Debug, thiserror::Error)]
pub enum ZoneError {
    /// A manager-level business rule declined the request
    #[error("Vetoed: {0}")]
    Veto(String),

    /// No zone manager is registered for the zone's type
    #[error("No such zone: {0}")]
    NoSuchZone(ZoneId),

    /// The zone id does not carry a valid zone type tag
    #[error("Zone id {0} has no valid zone type")]
    InvalidZoneType(ZoneId),

    /// A zone manager is already registered for this zone type
    #[error("Zone manager already registered for zone type {0}")]
    DuplicateZoneManager(ZoneType),

    /// Asynchronous zone or scene resolution failed
    #[error("Resolution failed: {0}")]
    ResolutionFailed(String),

    /// Asynchronous resolution did not complete within the configured bound
    #[error("Resolution of {what} timed out")]
    ResolutionTimeout { what: String },

    /// An update arrived with a base version older than the list expects
    #[error("Update for scene {scene_id} has base version {got}, expected {expected}")]
    ContinuityViolation {
        scene_id: SceneId,
        expected: i32,
        got: i32,
    },

    /// An update does not apply to the scene model's current version
    #[error("Update for scene {scene_id} applies from version {update_base}, model is at {model_version}")]
    VersionMismatch {
        scene_id: SceneId,
        model_version: i32,
        update_base: i32,
    },

    /// An update kind was registered twice
    #[error("Update kind '{0}' is already registered")]
    DuplicateUpdateKind(&'static str),

    /// An update type code does not map to a live update kind
    #[error("Unknown update type code {0}")]
    UnknownUpdateType(u16),

    /// An update kind has not been registered with the codec
    #[error("Update kind '{0}' is not registered")]
    UnregisteredUpdateKind(String),

    /// Update (de)serialization failed
    #[error("Update codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The zone host lock could not be acquired in time
    #[error("Timed out waiting for zone host lock on {0}")]
    LockTimeout(ZoneId),

    /// The body disconnected while its request was in flight
    #[error("Body disconnected during move")]
    Disconnected,

    /// The location manager could not commit the body to the place
    #[error("Location commit failed: {0}")]
    LocationCommit(String),

    /// Any other internal failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ZoneError {
    /// Returns the reason string reported to the client for this error.
    pub fn reason_code(&self) -> Cow<'_, str> {
        match self {
            ZoneError::Veto(reason) => Cow::Borrowed(reason.as_str()),
            ZoneError::NoSuchZone(_) | ZoneError::InvalidZoneType(_) => Cow::Borrowed(NO_SUCH_ZONE),
            _ => Cow::Borrowed(INTERNAL_ERROR),
        }
    }

    /// Returns true if this error is a business-rule veto rather than a fault.
    pub fn is_veto(&self) -> bool {
        matches!(self, ZoneError::Veto(_))
    }
}
