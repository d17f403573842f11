//! # Zone System
//!
//! Zone travel and scene update propagation for distributed game servers.
//!
//! Players (bodies) move between zones, which are groups of versioned scenes.
//! Zones are resolved lazily, may be hosted on any node of a cluster, and
//! clients are kept in sync with a scene through ordered delta records
//! instead of full snapshots whenever possible.
//!
//! ## Core Components
//!
//! - **[`UpdateList`]**: per-scene ordered, contiguous log of [`SceneUpdate`]s
//! - **[`UpdateTypeRegistry`] / [`UpdateCodec`]**: integer codes for update kinds and
//!   the persisted [`StoredUpdate`] form
//! - **[`SceneRegistry`]**: resolves each scene once and caches its [`SceneManager`]
//! - **[`ZoneManager`]**: per zone type contract for resolution and entry/exit ratification
//! - **[`ZoneRegistry`]**: maps zone types to managers and runs moves
//! - **[`ZoneMoveHandler`]**: per-request move state machine
//! - **[`ZonePeerManager`]**: cluster-wide directory of hosted zones plus the zone host lock
//!
//! ## Move flow
//!
//! ```text
//! move_to(body, zone, scene, version)
//!   ├─ ratify exit with the current zone's manager
//!   ├─ look up the target zone's manager by zone type
//!   ├─ find the hosting node or claim and resolve the zone locally
//!   ├─ ratify entry with the target manager
//!   ├─ resolve the scene
//!   ├─ commit the body to the scene's place
//!   └─ reply with nothing, deltas or a snapshot depending on `version`
//! ```

pub mod body;
pub mod codec;
pub mod config;
pub mod error;
pub mod location;
pub mod move_handler;
pub mod peer;
pub mod registry;
pub mod scene;
pub mod shutdown;
pub mod stats;
pub mod types;
pub mod update;
pub mod update_list;
pub mod utils;
pub mod zone;

#[cfg(test)]
mod tests;

pub use body::ZonedBody;
pub use codec::{StoredUpdate, UpdateCodec, UpdateTypeRegistry};
pub use config::MovementConfig;
pub use error::{ZoneError, INTERNAL_ERROR, NO_SUCH_ZONE};
pub use location::LocationManager;
pub use move_handler::{MoveRequest, MoveResult, MoveState, ZoneMoveHandler};
pub use peer::{
    ClusterStore, HostedZone, InMemoryCluster, LockKey, LockOutcome, NodeInfo, NodeRecord,
    ZoneClaim, ZonePeerManager,
};
pub use registry::ZoneRegistry;
pub use scene::{
    LoadedScene, MemorySceneStore, PlaceConfig, SceneLoader, SceneManager, SceneModel,
    SceneRegistry,
};
pub use shutdown::ShutdownState;
pub use stats::ZoneRegistryStats;
pub use types::*;
pub use update::{SceneUpdate, SetSceneData, SetSceneName, UpdateKind, UpdatePayload};
pub use update_list::UpdateList;
pub use utils::current_timestamp;
pub use zone::{Resolution, ZoneManager, ZoneResolutionTable, ZoneState, ZoneSummary};
