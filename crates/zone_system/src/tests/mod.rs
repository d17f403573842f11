//! Multi-component tests for zone travel
//!
//! - Move protocol: ratification, resolution, snapshot versus delta replies
//! - Failure handling: vetoes, missing managers, timeouts, disconnects
//! - Cluster hosting: server switches, lock races, zone hand-off




#[cfg(test)]
pub mod cluster_test;
