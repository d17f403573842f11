//! Small helpers shared across the zone system.

/// Returns the current Unix timestamp in seconds.
///
/// A clock set before the Unix epoch yields 0.
pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
