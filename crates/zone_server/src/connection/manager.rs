//! Connection manager for tracking and managing client connections.
//!
//! This module provides the central management system for all client connections,
//! handling connection lifecycle, body assignment, and outgoing message delivery.

use super::{client::ClientConnection, ConnectionId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info};
use zone_system::ZonedBody;

/// Central manager for all client connections.
///
/// The `ConnectionManager` tracks active connections, assigns unique IDs,
/// owns the body each connection travels as, and queues outgoing messages.
///
/// # Architecture
///
/// * Uses `RwLock<HashMap>` for connection storage
/// * Implements atomic connection ID generation
/// * Provides a broadcast channel that connection writers filter by ID
#[derive(Debug)]
pub struct ConnectionManager {
    /// Map of connection ID to client connection information
    connections: Arc<RwLock<HashMap<ConnectionId, ClientConnection>>>,

    /// Atomic counter for generating unique connection IDs
    next_id: Arc<AtomicUsize>,

    /// Broadcast sender for outgoing messages to specific connections
    sender: broadcast::Sender<(ConnectionId, Vec<u8>)>,
}

impl ConnectionManager {
    /// Creates a new connection manager.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1000);
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicUsize::new(1)),
            sender,
        }
    }

    /// Adds a new connection and returns its ID and body.
    ///
    /// # Arguments
    ///
    /// * `remote_addr` - The network address of the connecting client
    pub async fn add_connection(&self, remote_addr: SocketAddr) -> (ConnectionId, Arc<ZonedBody>) {
        let connection_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let connection = ClientConnection::new(remote_addr);
        let body = connection.body.clone();
        self.connections.write().await.insert(connection_id, connection);
        info!(
            "🔗 Connection {} from {} as body {}",
            connection_id,
            remote_addr,
            body.body_id()
        );
        (connection_id, body)
    }

    /// Removes a connection and marks its body disconnected.
    ///
    /// Move handlers still in flight for the body observe the disconnect
    /// and fail instead of committing.
    pub async fn remove_connection(&self, connection_id: ConnectionId) -> Option<Arc<ZonedBody>> {
        let removed = self.connections.write().await.remove(&connection_id);
        removed.map(|connection| {
            connection.body.disconnect();
            info!(
                "❌ Connection {} from {} disconnected",
                connection_id, connection.remote_addr
            );
            connection.body
        })
    }

    /// The body travelling on behalf of a connection.
    pub async fn get_body(&self, connection_id: ConnectionId) -> Option<Arc<ZonedBody>> {
        let connections = self.connections.read().await;
        connections.get(&connection_id).map(|c| c.body.clone())
    }

    /// Queues a message for delivery to the specified connection.
    pub async fn send_to_connection(&self, connection_id: ConnectionId, message: Vec<u8>) {
        if let Err(e) = self.sender.send((connection_id, message)) {
            error!("Failed to send message to connection {}: {:?}", connection_id, e);
        }
    }

    /// Creates a new receiver for outgoing messages.
    ///
    /// Each connection handler should call this and keep only the messages
    /// targeted at its own connection.
    pub fn subscribe(&self) -> broadcast::Receiver<(ConnectionId, Vec<u8>)> {
        self.sender.subscribe()
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
