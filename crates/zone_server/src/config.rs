//! Server configuration types and defaults.
//!
//! Besides network settings the server configuration declares this node's
//! identity in the cluster and the zones and scenes it can host.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use zone_system::{MovementConfig, NodeInfo, NodeName, SceneId, ZoneId, ZoneType};

/// Configuration structure for the zone server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent connections allowed
    pub max_connections: usize,

    /// Connection timeout in seconds
    pub connection_timeout: u64,

    /// How clients and peers reach this node
    pub node: NodeInfo,

    /// Timeouts and lock timing for moves
    pub movement: MovementConfig,

    /// Zones this node can host
    pub zones: Vec<ZoneDefinition>,
}

/// A zone declared in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneDefinition {
    /// Zone type tag, 1..=127
    pub zone_type: u8,
    /// Id of the zone within its type
    pub local_id: i32,
    pub name: String,
    /// Scene bodies land in when none is requested
    pub default_scene: i32,
    /// Maximum number of bodies in the zone (unlimited if absent)
    #[serde(default)]
    pub capacity: Option<usize>,
    #[serde(default)]
    pub scenes: Vec<SceneDefinition>,
}

impl ZoneDefinition {
    /// The qualified zone id, or `None` if the zone type is invalid.
    pub fn zone_id(&self) -> Option<ZoneId> {
        ZoneType::new(self.zone_type).map(|zone_type| ZoneId::qualify(zone_type, self.local_id))
    }

    pub fn default_scene_id(&self) -> SceneId {
        SceneId(self.default_scene)
    }
}

/// A scene declared as part of a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDefinition {
    pub scene_id: i32,
    pub name: String,
    /// Client-side controller for the scene's place
    #[serde(default = "default_place_type")]
    pub place_type: String,
}

fn default_place_type() -> String {
    "scene".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        let bind_address = SocketAddr::from(([127, 0, 0, 1], 8080));
        Self {
            bind_address,
            max_connections: 1000,
            connection_timeout: 60,
            node: NodeInfo {
                name: NodeName::new("node-1"),
                public_host: bind_address.ip().to_string(),
                port: bind_address.port(),
            },
            movement: MovementConfig::default(),
            zones: Vec::new(),
        }
    }
}
