//! Message handling and routing for client-server communication.
//!
//! This module parses client messages and dispatches zone travel requests
//! to the zone registry.

pub mod router;
pub mod types;

pub use router::route_client_message;
pub use types::{ClientMessage, ServerMessage};
