//! Factory functions for creating zone servers.

use crate::{config::ServerConfig, error::ServerError, server::ZoneServer};
use std::sync::Arc;
use zone_system::ClusterStore;

/// Creates a zone server with default configuration.
///
/// The default configuration declares no zones, so every move request
/// fails with `m.no_such_zone`. Useful for smoke tests of the transport.
///
/// # Example
///
/// ```rust
/// # #[tokio::main]
/// # async fn main() {
/// use zone_server::create_server;
///
/// let server = create_server().await.unwrap();
/// # }
/// ```
pub async fn create_server() -> Result<ZoneServer, ServerError> {
    ZoneServer::new(ServerConfig::default()).await
}

/// Creates a zone server with custom configuration in its own cluster.
///
/// # Example
///
/// ```rust
/// # #[tokio::main]
/// # async fn main() {
/// use zone_server::{create_server_with_config, ServerConfig};
///
/// let config = ServerConfig {
///     bind_address: "0.0.0.0:9000".parse().unwrap(),
///     max_connections: 5000,
///     ..Default::default()
/// };
///
/// let server = create_server_with_config(config).await.unwrap();
/// # }
/// ```
pub async fn create_server_with_config(config: ServerConfig) -> Result<ZoneServer, ServerError> {
    ZoneServer::new(config).await
}

/// Creates a zone server that joins a shared cluster directory.
pub async fn create_server_with_cluster(
    config: ServerConfig,
    cluster: Arc<dyn ClusterStore>,
) -> Result<ZoneServer, ServerError> {
    ZoneServer::with_cluster(config, cluster).await
}
