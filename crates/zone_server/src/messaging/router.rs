//! Message routing logic for dispatching client messages.
//!
//! Zone travel requests are handed to the [`ZoneRegistry`] on their own task
//! so a slow zone resolution never stalls the connection's read loop. The
//! reply is queued on the connection manager once the move completes.

use crate::connection::{ConnectionId, ConnectionManager};
use crate::error::ServerError;
use crate::messaging::{ClientMessage, ServerMessage};
use crate::protocol::MoveResponse;
use std::sync::Arc;
use tracing::{debug, trace, warn};
use zone_system::{MoveRequest, ZoneRegistry};

/// Routes a raw client message to the handler for its namespace and event.
///
/// # Arguments
///
/// * `text` - The raw message text from the client (expected to be JSON)
/// * `connection_id` - The unique identifier for the client connection
/// * `connection_manager` - Manager for looking up the connection's body and replying
/// * `registry` - Zone registry that performs moves
///
/// # Returns
///
/// `Ok(())` if the message was accepted, or a `ServerError` if parsing
/// failed, the connection is gone, or the event is unknown.
///
/// # Supported events
///
/// * `zone/move_to` - Move into a zone and scene, replies `zone/move_result`
/// * `zone/leave_zone` - Leave the occupied zone, replies `zone/left_zone`
/// * `system/ping` - Replies `system/pong`
pub async fn route_client_message(
    text: &str,
    connection_id: ConnectionId,
    connection_manager: &Arc<ConnectionManager>,
    registry: &Arc<ZoneRegistry>,
) -> Result<(), ServerError> {
    let message: ClientMessage = serde_json::from_str(text)
        .map_err(|e| ServerError::Network(format!("Invalid JSON: {e}")))?;

    let body = connection_manager
        .get_body(connection_id)
        .await
        .ok_or_else(|| ServerError::Internal("Connection not found".to_string()))?;

    debug!(
        "📨 Routing '{}:{}' from connection {}",
        message.namespace, message.event, connection_id
    );

    match (message.namespace.as_str(), message.event.as_str()) {
        ("zone", "move_to") => {
            let request: MoveRequest = serde_json::from_value(message.data)
                .map_err(|e| ServerError::Network(format!("Invalid move request: {e}")))?;

            let connection_manager = connection_manager.clone();
            let registry = registry.clone();
            tokio::spawn(async move {
                let result = registry
                    .move_to(&body, request.zone_id, request.scene_id, request.scene_version)
                    .await;
                let response = MoveResponse::from_result(result, registry.scenes().codec());
                reply(&connection_manager, connection_id, "zone", "move_result", &response).await;
            });
        }
        ("zone", "leave_zone") => {
            registry.leave_occupied_zone(&body).await;
            reply(
                connection_manager,
                connection_id,
                "zone",
                "left_zone",
                &serde_json::Value::Null,
            )
            .await;
        }
        ("system", "ping") => {
            reply(
                connection_manager,
                connection_id,
                "system",
                "pong",
                &serde_json::json!({ "timestamp": zone_system::current_timestamp() }),
            )
            .await;
        }
        (namespace, event) => {
            return Err(ServerError::Network(format!(
                "Unknown event '{namespace}:{event}'"
            )));
        }
    }

    trace!("✅ Routed message from connection {}", connection_id);
    Ok(())
}

/// Serializes a reply and queues it for one connection.
async fn reply<T: serde::Serialize>(
    connection_manager: &ConnectionManager,
    connection_id: ConnectionId,
    namespace: &str,
    event: &str,
    data: &T,
) {
    let bytes = serde_json::to_value(data)
        .and_then(|data| ServerMessage::new(namespace, event, data).to_bytes());
    match bytes {
        Ok(bytes) => connection_manager.send_to_connection(connection_id, bytes).await,
        Err(e) => warn!(
            "⚠️ Failed to serialize '{}:{}' reply for connection {}: {}",
            namespace, event, connection_id, e
        ),
    }
}
