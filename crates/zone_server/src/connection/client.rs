//! Client connection representation.
//!
//! Every connection travels the zone system as one [`ZonedBody`], created
//! when the socket is accepted and disconnected when it closes.

use std::net::SocketAddr;
use std::sync::Arc;
use zone_system::{current_timestamp, BodyId, ZonedBody};

/// Represents an individual client connection to the server.
///
/// # Fields
///
/// * `body` - The body moved between zones on behalf of this client
/// * `remote_addr` - The network address of the connected client
/// * `connected_at` - Unix timestamp when the connection was established
#[derive(Debug)]
pub struct ClientConnection {
    /// The body this connection moves
    pub body: Arc<ZonedBody>,

    /// The remote network address of the client
    pub remote_addr: SocketAddr,

    /// When this connection was established, in seconds since the epoch
    pub connected_at: u64,
}

impl ClientConnection {
    /// Creates a connection with a fresh body named after its remote address.
    pub fn new(remote_addr: SocketAddr) -> Self {
        Self {
            body: Arc::new(ZonedBody::new(BodyId::new(), remote_addr.to_string())),
            remote_addr,
            connected_at: current_timestamp(),
        }
    }
}
