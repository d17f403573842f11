//! Message type definitions for client-server communication.
//!
//! Messages in both directions use the same namespace/event envelope.

use serde::{Deserialize, Serialize};

/// A message sent from a client to the server.
///
/// # Fields
///
/// * `namespace` - The handler namespace (e.g. "zone", "system")
/// * `event` - The specific event within the namespace (e.g. "move_to")
/// * `data` - The payload data for the event as a JSON value
///
/// # Examples
///
/// A move request into zone 7 of type 1, holding version 2 of scene 100:
/// ```json
/// {
///   "namespace": "zone",
///   "event": "move_to",
///   "data": {
///     "zone_id": 16777223,
///     "scene_id": 100,
///     "scene_version": 2
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    /// The namespace that should handle this message
    pub namespace: String,

    /// The specific event type within the namespace
    pub event: String,

    /// The message payload as a JSON value
    #[serde(default)]
    pub data: serde_json::Value,
}

/// A message sent from the server to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerMessage {
    pub namespace: String,
    pub event: String,
    pub data: serde_json::Value,
}

impl ServerMessage {
    pub fn new(namespace: &str, event: &str, data: serde_json::Value) -> Self {
        Self {
            namespace: namespace.to_string(),
            event: event.to_string(),
            data,
        }
    }

    /// Serializes the message into a frame payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
