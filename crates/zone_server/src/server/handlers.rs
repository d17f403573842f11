//! Connection handling logic for WebSocket clients.
//!
//! This module manages the lifecycle of individual client connections,
//! including WebSocket handshaking, message processing, and cleanup of the
//! connection's body when it goes away.

use crate::{connection::ConnectionManager, error::ServerError, messaging::route_client_message};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, trace};
use zone_system::ZoneRegistry;

/// Handles a single client connection from establishment to cleanup.
///
/// # Connection Flow
///
/// 1. Perform WebSocket handshake
/// 2. Register the connection and create its body
/// 3. Run the incoming and outgoing message tasks
/// 4. Mark the body disconnected and take it out of its zone
///
/// # Arguments
///
/// * `stream` - The TCP stream for the client connection
/// * `addr` - The remote address of the client
/// * `connection_manager` - Manager for tracking connections
/// * `registry` - Zone registry that serves move requests
/// * `idle_timeout` - How long a connection may stay silent before it is closed
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    connection_manager: Arc<ConnectionManager>,
    registry: Arc<ZoneRegistry>,
    idle_timeout: Duration,
) -> Result<(), ServerError> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| ServerError::Network(format!("WebSocket handshake failed: {e}")))?;

    let (ws_sender, mut ws_receiver) = ws_stream.split();
    let ws_sender = Arc::new(tokio::sync::Mutex::new(ws_sender));
    let (connection_id, body) = connection_manager.add_connection(addr).await;

    let mut message_receiver = connection_manager.subscribe();
    let ws_sender_incoming = ws_sender.clone();
    let ws_sender_outgoing = ws_sender.clone();

    // Incoming message task - routes requests to the zone registry
    let incoming_task = {
        let connection_manager = connection_manager.clone();
        let registry = registry.clone();

        async move {
            loop {
                let msg = match tokio::time::timeout(idle_timeout, ws_receiver.next()).await {
                    Ok(Some(msg)) => msg,
                    Ok(None) => break,
                    Err(_) => {
                        info!("⌛ Connection {} idle for {:?}, closing", connection_id, idle_timeout);
                        break;
                    }
                };
                match msg {
                    Ok(Message::Text(text)) => {
                        if let Err(e) =
                            route_client_message(&text, connection_id, &connection_manager, &registry)
                                .await
                        {
                            trace!("❌ Message routing error: {}", e);
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("🔌 Client {} requested close", connection_id);
                        break;
                    }
                    Ok(Message::Ping(data)) => {
                        let mut ws_sender = ws_sender_incoming.lock().await;
                        let _ = ws_sender.send(Message::Pong(data)).await;
                    }
                    Err(e) => {
                        error!("WebSocket error for connection {}: {}", connection_id, e);
                        break;
                    }
                    _ => {}
                }
            }
        }
    };

    // Outgoing message task
    let outgoing_task = {
        let ws_sender = ws_sender_outgoing;
        async move {
            while let Ok((target_connection_id, message)) = message_receiver.recv().await {
                if target_connection_id == connection_id {
                    let message_text = String::from_utf8_lossy(&message);
                    let mut ws_sender = ws_sender.lock().await;
                    if let Err(e) = ws_sender
                        .send(Message::Text(message_text.to_string().into()))
                        .await
                    {
                        error!("Failed to send message: {}", e);
                        break;
                    }
                }
            }
        }
    };

    tokio::select! {
        _ = incoming_task => {},
        _ = outgoing_task => {},
    }

    connection_manager.remove_connection(connection_id).await;
    registry.leave_occupied_zone(&body).await;
    Ok(())
}
