//! # Zone Server
//!
//! WebSocket front end for the zone system. Clients connect, receive a body,
//! and ask to move between zones and scenes; the server answers each request
//! with the scene state the client needs, or tells it which node to
//! reconnect to when another node hosts the zone.
//!
//! ## Message Flow
//!
//! 1. Client sends a `{namespace, event, data}` message, e.g. `zone/move_to`
//! 2. The router parses it and hands the request to the [`zone_system::ZoneRegistry`]
//! 3. The move runs on its own task; its result is encoded as a
//!    [`protocol::MoveResponse`] and queued on the connection manager
//! 4. The connection's outgoing task writes it to the socket
//!
//! ## Configuration
//!
//! The server is configured through [`ServerConfig`]:
//!
//! * **Network settings** - Bind address, connection limits, idle timeout
//! * **Node identity** - Name and public address published to the cluster
//! * **Movement** - Resolution timeout and zone host lock timing
//! * **Zones** - The zones and scenes this node can host
//!
//! ## Error Handling
//!
//! [`ServerError`] covers transport and setup failures. Move failures are
//! not errors at this layer; they reach the client as a `failed` response
//! carrying a reason code.

// Re-export core types and functions for easy access
pub use config::{SceneDefinition, ServerConfig, ZoneDefinition};
pub use error::ServerError;
pub use server::ZoneServer;
pub use utils::{create_server, create_server_with_cluster, create_server_with_config};

// Public module declarations
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod utils;
pub mod zones;

// Internal modules (not part of public API)
mod connection;
mod messaging;
mod tests;
