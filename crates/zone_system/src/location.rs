//! Location collaborator: the component that actually places a body in a place.

use crate::body::ZonedBody;
use crate::error::ZoneError;
use crate::scene::PlaceConfig;
use crate::types::PlaceOid;
use async_trait::async_trait;

/// Commits a body's presence to a place.
#[async_trait]
pub trait LocationManager: Send + Sync {
    /// Moves the body's session into the place, leaving any place it occupied.
    ///
    /// On error the body must still be in its previous place.
    async fn commit_move(
        &self,
        body: &ZonedBody,
        place_oid: PlaceOid,
        place_config: &PlaceConfig,
    ) -> Result<(), ZoneError>;

    /// Removes the body from whatever place it occupies.
    async fn leave_place(&self, _body: &ZonedBody) {}
}
