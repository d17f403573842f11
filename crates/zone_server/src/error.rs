//! Error types and handling for the zone server.

/// Enumeration of possible server errors.
///
/// Categorizes errors into network-related and internal server errors.
/// Move failures are not server errors: they are reported to the client as
/// a failed move response.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Network-related errors such as binding failures, bad frames or handshake issues
    #[error("Network error: {0}")]
    Network(String),

    /// Internal server errors including zone registry setup and cluster failures
    #[error("Internal error: {0}")]
    Internal(String),
}
