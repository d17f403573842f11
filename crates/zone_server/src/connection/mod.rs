//! Connection management for client connections.
//!
//! This module handles the lifecycle of client connections, including
//! connection tracking, the body each connection travels as, and outgoing
//! message delivery.

pub mod client;
pub mod manager;

pub use manager::ConnectionManager;

/// Type alias for connection identifiers.
///
/// Connection IDs are used to uniquely identify client connections
/// throughout their lifecycle on the server.
pub type ConnectionId = usize;
