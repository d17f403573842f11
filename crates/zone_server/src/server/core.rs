//! Core zone server implementation.
//!
//! This module contains the main `ZoneServer` struct. It wires the configured
//! zones into a [`ZoneRegistry`], joins the cluster directory, and runs the
//! WebSocket accept loop.

use crate::{
    config::{ServerConfig, ZoneDefinition},
    connection::ConnectionManager,
    error::ServerError,
    server::handlers::handle_connection,
    zones::{ServerLocationManager, StaticZoneManager},
};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};
use zone_system::{
    ClusterStore, InMemoryCluster, MemorySceneStore, SceneId, SceneModel, SceneRegistry,
    ShutdownState, UpdateCodec, ZonePeerManager, ZoneRegistry, ZoneRegistryStats, ZoneType,
};

/// How often the accept loop checks the shared shutdown state.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// The zone server.
///
/// `ZoneServer` accepts WebSocket clients and serves their zone travel
/// requests from the zones declared in its configuration.
///
/// # Architecture
///
/// * **Zone Registry**: Resolves zones and drives each move
/// * **Connection Management**: WebSocket connection lifecycle and the body of each client
/// * **Peer Manager**: Publishes the zones this node hosts to the cluster directory
pub struct ZoneServer {
    /// Server configuration settings
    config: ServerConfig,

    /// Zone registry serving every move on this node
    registry: Arc<ZoneRegistry>,

    /// Manager for client connections and messaging
    connection_manager: Arc<ConnectionManager>,

    /// Places occupied by bodies on this node
    locations: Arc<ServerLocationManager>,

    /// Channel for coordinating server shutdown
    shutdown_sender: broadcast::Sender<()>,
}

impl ZoneServer {
    /// Creates a server that is the only node of its own in-memory cluster.
    pub async fn new(config: ServerConfig) -> Result<Self, ServerError> {
        Self::with_cluster(config, Arc::new(InMemoryCluster::new())).await
    }

    /// Creates a server that joins the given cluster directory.
    ///
    /// # Component Initialization
    ///
    /// 1. Builds the scene store from the configured zones
    /// 2. Joins the cluster as `config.node`
    /// 3. Registers one zone manager per configured zone type
    pub async fn with_cluster(
        config: ServerConfig,
        cluster: Arc<dyn ClusterStore>,
    ) -> Result<Self, ServerError> {
        let store = build_scene_store(&config.zones);
        let scenes = Arc::new(SceneRegistry::new(Arc::new(store), UpdateCodec::default()));
        let locations = Arc::new(ServerLocationManager::new());

        let peers = ZonePeerManager::join(config.node.clone(), cluster, config.movement.clone())
            .await
            .map_err(|e| ServerError::Internal(format!("Failed to join cluster: {e}")))?;

        let registry = ZoneRegistry::new(scenes, locations.clone(), config.movement.clone())
            .with_peers(Arc::new(peers));

        for zone_type in configured_zone_types(&config.zones)? {
            let manager = StaticZoneManager::new(zone_type, &config.zones);
            info!(
                "🗺️ Zone type {} serves {} configured zone(s)",
                zone_type,
                manager.zone_count()
            );
            registry
                .register_zone_manager(zone_type, Arc::new(manager))
                .map_err(|e| ServerError::Internal(e.to_string()))?;
        }

        let (shutdown_sender, _) = broadcast::channel(1);
        Ok(Self {
            config,
            registry: Arc::new(registry),
            connection_manager: Arc::new(ConnectionManager::new()),
            locations,
            shutdown_sender,
        })
    }

    /// Binds the configured address and serves until shutdown is initiated.
    pub async fn start_with_shutdown_state(
        &self,
        shutdown_state: ShutdownState,
    ) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_address)
            .await
            .map_err(|e| ServerError::Network(format!("Failed to bind {}: {e}", self.config.bind_address)))?;
        self.serve(listener, shutdown_state).await
    }

    /// Runs the accept loop on an already bound listener.
    ///
    /// The loop stops when `shutdown_state` is initiated or [`ZoneServer::shutdown`]
    /// is called. Connections beyond `max_connections` are dropped on accept.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown_state: ShutdownState,
    ) -> Result<(), ServerError> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Network(e.to_string()))?;
        info!(
            "🚀 Zone server '{}' listening on {}",
            self.config.node.name, local_addr
        );

        let mut shutdown_receiver = self.shutdown_sender.subscribe();
        let mut shutdown_check = interval(SHUTDOWN_POLL);
        let idle_timeout = Duration::from_secs(self.config.connection_timeout);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => self.accept(stream, addr, idle_timeout).await,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        break;
                    }
                },
                _ = shutdown_check.tick() => {
                    if shutdown_state.is_shutdown_initiated() {
                        info!("🛑 Accept loop stopping - shutdown initiated");
                        break;
                    }
                }
                _ = shutdown_receiver.recv() => {
                    info!("Internal shutdown signal received");
                    break;
                }
            }
        }

        info!("Server stopped");
        Ok(())
    }

    async fn accept(&self, stream: tokio::net::TcpStream, addr: SocketAddr, idle_timeout: Duration) {
        if self.connection_manager.connection_count().await >= self.config.max_connections {
            warn!(
                "🚫 Refusing connection from {}: {} connections open",
                addr, self.config.max_connections
            );
            return;
        }

        let connection_manager = self.connection_manager.clone();
        let registry = self.registry.clone();
        tokio::spawn(async move {
            if let Err(e) =
                handle_connection(stream, addr, connection_manager, registry, idle_timeout).await
            {
                error!("Connection error: {:?}", e);
            }
        });
    }

    /// Stops the accept loop, shuts down every hosted zone and leaves the cluster.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        let _ = self.shutdown_sender.send(());
        self.registry
            .shutdown()
            .await
            .map_err(|e| ServerError::Internal(format!("Zone shutdown failed: {e}")))
    }

    pub fn registry(&self) -> &Arc<ZoneRegistry> {
        &self.registry
    }

    pub fn locations(&self) -> &Arc<ServerLocationManager> {
        &self.locations
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub async fn connection_count(&self) -> usize {
        self.connection_manager.connection_count().await
    }

    pub fn stats(&self) -> ZoneRegistryStats {
        self.registry.stats()
    }
}

/// Distinct zone types of the configured zones.
fn configured_zone_types(zones: &[ZoneDefinition]) -> Result<BTreeSet<ZoneType>, ServerError> {
    zones
        .iter()
        .map(|def| {
            ZoneType::new(def.zone_type).ok_or_else(|| {
                ServerError::Internal(format!(
                    "Zone '{}' has invalid zone type {}",
                    def.name, def.zone_type
                ))
            })
        })
        .collect()
}

/// Builds the scene store for the configured zones.
///
/// A zone whose default scene is not listed gets one named after the zone.
fn build_scene_store(zones: &[ZoneDefinition]) -> MemorySceneStore {
    let store = MemorySceneStore::new();
    for def in zones {
        for scene in &def.scenes {
            store.insert_scene(
                SceneModel::new(SceneId(scene.scene_id), scene.name.as_str()),
                scene.place_type.as_str(),
            );
        }
        if !store.contains(def.default_scene_id()) {
            store.insert_scene(
                SceneModel::new(def.default_scene_id(), def.name.as_str()),
                "scene",
            );
        }
    }
    store
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SceneDefinition;

    fn zone_def(zone_type: u8, local_id: i32) -> ZoneDefinition {
        ZoneDefinition {
            zone_type,
            local_id,
            name: format!("Zone {local_id}"),
            default_scene: 100 + local_id,
            capacity: None,
            scenes: Vec::new(),
        }
    }

    #[test]
    fn test_default_scenes_are_created() {
        let mut docks = zone_def(1, 1);
        docks.scenes.push(SceneDefinition {
            scene_id: 500,
            name: "Warehouse".into(),
            place_type: "interior".into(),
        });
        let store = build_scene_store(&[docks, zone_def(1, 2)]);

        assert!(store.contains(SceneId(101)));
        assert!(store.contains(SceneId(102)));
        assert!(store.contains(SceneId(500)));
    }

    #[test]
    fn test_invalid_zone_type_is_rejected() {
        let zones = vec![zone_def(1, 1), zone_def(2, 1), zone_def(1, 2)];
        assert_eq!(configured_zone_types(&zones).unwrap().len(), 2);

        let err = configured_zone_types(&[zone_def(0, 1)]).unwrap_err();
        assert!(matches!(err, ServerError::Internal(_)));
    }

    #[tokio::test]
    async fn test_server_registers_configured_zone_types() {
        let config = ServerConfig {
            zones: vec![zone_def(1, 1), zone_def(3, 1)],
            ..ServerConfig::default()
        };
        let server = ZoneServer::new(config).await.unwrap();

        assert_eq!(server.stats().managers, 2);
        assert!(server.registry().manager(ZoneType::new(3).unwrap()).is_some());
        assert!(server.registry().peers().is_some());

        server.shutdown().await.unwrap();
        assert!(server.registry().shutdown_state().is_shutdown_complete());
    }
}
