//! Configuration management for the zone host.
//!
//! This module handles loading, validation, and conversion of host configuration
//! from TOML files and command-line arguments.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use zone_server::{SceneDefinition, ServerConfig, ZoneDefinition};
use zone_system::{MovementConfig, NodeInfo, NodeName, LOCAL_ZONE_MASK};

/// Application configuration loaded from TOML file.
///
/// Covers networking, this node's cluster identity, move timing, logging,
/// and the zones the node can host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration settings
    pub server: ServerSettings,
    /// Cluster identity of this node
    pub node: NodeSettings,
    /// Move timeouts and zone host lock timing
    #[serde(default)]
    pub movement: MovementSettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
    /// Zones this node can host
    #[serde(default)]
    pub zones: Vec<ZoneDefinition>,
}

/// Server-specific configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Network address to bind the server to (e.g., "127.0.0.1:8080")
    pub bind_address: String,
    /// Maximum number of concurrent client connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Idle connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
}

pub fn default_connection_timeout() -> u64 {
    60
}

fn default_max_connections() -> usize {
    1000
}

/// How clients and peers reach this node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Unique name of the node in the cluster
    pub name: String,
    /// Host name clients use when told to switch to this node
    pub public_host: String,
    /// Port clients use when told to switch to this node
    pub public_port: u16,
}

/// Move timing, in the units named by each field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementSettings {
    #[serde(default = "default_resolution_timeout_secs")]
    pub resolution_timeout_secs: u64,
    #[serde(default = "default_lock_wait_ms")]
    pub lock_wait_ms: u64,
    #[serde(default = "default_lock_poll_interval_ms")]
    pub lock_poll_interval_ms: u64,
    #[serde(default = "default_lock_lease_secs")]
    pub lock_lease_secs: u64,
}

fn default_resolution_timeout_secs() -> u64 { 10 }
fn default_lock_wait_ms() -> u64 { 5000 }
fn default_lock_poll_interval_ms() -> u64 { 50 }
fn default_lock_lease_secs() -> u64 { 60 }

impl Default for MovementSettings {
    fn default() -> Self {
        Self {
            resolution_timeout_secs: default_resolution_timeout_secs(),
            lock_wait_ms: default_lock_wait_ms(),
            lock_poll_interval_ms: default_lock_poll_interval_ms(),
            lock_lease_secs: default_lock_lease_secs(),
        }
    }
}

impl MovementSettings {
    pub fn to_movement_config(&self) -> MovementConfig {
        MovementConfig {
            resolution_timeout: Duration::from_secs(self.resolution_timeout_secs),
            lock_wait: Duration::from_millis(self.lock_wait_ms),
            lock_poll_interval: Duration::from_millis(self.lock_poll_interval_ms),
            lock_lease: Duration::from_secs(self.lock_lease_secs),
        }
    }
}

/// Logging system configuration.
///
/// Controls log output format, levels, and destination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
    /// Optional file that receives a copy of the log output
    pub file_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                bind_address: "127.0.0.1:8080".to_string(),
                max_connections: 1000,
                connection_timeout: 60,
            },
            node: NodeSettings {
                name: "node-1".to_string(),
                public_host: "127.0.0.1".to_string(),
                public_port: 8080,
            },
            movement: MovementSettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
                file_path: None,
            },
            zones: vec![ZoneDefinition {
                zone_type: 1,
                local_id: 1,
                name: "Harbor".to_string(),
                default_scene: 1,
                capacity: None,
                scenes: vec![
                    SceneDefinition {
                        scene_id: 1,
                        name: "Harbor Square".to_string(),
                        place_type: "scene".to_string(),
                    },
                    SceneDefinition {
                        scene_id: 2,
                        name: "Lighthouse".to_string(),
                        place_type: "scene".to_string(),
                    },
                ],
            }],
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the specified path
    /// and returns the default configuration.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Converts the application configuration to a zone server configuration.
    pub fn to_server_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        Ok(ServerConfig {
            bind_address: self.server.bind_address.parse()?,
            max_connections: self.server.max_connections,
            connection_timeout: self.server.connection_timeout,
            node: NodeInfo {
                name: NodeName::new(self.node.name.as_str()),
                public_host: self.node.public_host.clone(),
                port: self.node.public_port,
            },
            movement: self.movement.to_movement_config(),
            zones: self.zones.clone(),
        })
    }

    /// Validates the configuration.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is usable, or a message naming the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!(
                "Invalid bind address: {}",
                &self.server.bind_address
            ));
        }

        if self.node.name.trim().is_empty() {
            return Err("Node name cannot be empty".to_string());
        }

        if self.server.connection_timeout == 0 {
            return Err("server.connection_timeout must be greater than 0".to_string());
        }

        let movement = &self.movement;
        if movement.resolution_timeout_secs == 0
            || movement.lock_wait_ms == 0
            || movement.lock_poll_interval_ms == 0
            || movement.lock_lease_secs == 0
        {
            return Err("Movement timeouts must be greater than 0".to_string());
        }

        let mut seen = HashSet::new();
        for zone in &self.zones {
            let zone_id = zone.zone_id().ok_or_else(|| {
                format!(
                    "Zone '{}' has zone type {}; must be between 1 and 127",
                    zone.name, zone.zone_type
                )
            })?;
            if zone.local_id < 0 || zone.local_id > LOCAL_ZONE_MASK {
                return Err(format!(
                    "Zone '{}' has local id {} outside 0..={}",
                    zone.name, zone.local_id, LOCAL_ZONE_MASK
                ));
            }
            if !seen.insert(zone_id) {
                return Err(format!("Duplicate zone id {zone_id} ('{}')", zone.name));
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.server.bind_address, "127.0.0.1:8080");
        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(config.node.name, "node-1");
        assert_eq!(config.movement, MovementSettings::default());
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file_path.is_none());
        assert_eq!(config.zones.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file_writes_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:8080");
        assert!(path.exists());

        // The written default must load back to the same settings
        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded.zones, config.zones);
        assert_eq!(reloaded.movement, config.movement);
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let toml_content = r#"
[server]
bind_address = "0.0.0.0:3000"
max_connections = 2000

[node]
name = "harbor-2"
public_host = "harbor-2.internal"
public_port = 3000

[movement]
lock_wait_ms = 250

[logging]
level = "debug"
json_format = true

[[zones]]
zone_type = 2
local_id = 14
name = "Market"
default_scene = 40
capacity = 25

[[zones.scenes]]
scene_id = 40
name = "Market Row"
"#;
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(toml_content.as_bytes()).unwrap();
        let path = file.path().to_path_buf();

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.server.max_connections, 2000);
        assert_eq!(config.server.connection_timeout, 60);
        assert_eq!(config.node.public_port, 3000);
        assert_eq!(config.movement.lock_wait_ms, 250);
        assert_eq!(config.movement.resolution_timeout_secs, 10);
        assert!(config.logging.json_format);

        let zone = &config.zones[0];
        assert_eq!(zone.capacity, Some(25));
        assert_eq!(zone.scenes[0].place_type, "scene");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_to_server_config_conversion() {
        let config = AppConfig::default();
        let server_config = config.to_server_config().unwrap();

        assert_eq!(server_config.bind_address.port(), 8080);
        assert_eq!(server_config.node.name, NodeName::new("node-1"));
        assert_eq!(server_config.movement, MovementConfig::default());
        assert_eq!(server_config.zones, config.zones);
    }

    #[test]
    fn test_validation_rejects_bad_settings() {
        let mut config = AppConfig::default();
        config.server.bind_address = "invalid".to_string();
        assert!(config.validate().unwrap_err().contains("bind address"));

        let mut config = AppConfig::default();
        config.node.name = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.movement.lock_wait_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().unwrap_err().contains("log level"));
    }

    #[test]
    fn test_validation_rejects_bad_zones() {
        let mut config = AppConfig::default();
        config.zones[0].zone_type = 0;
        assert!(config.validate().unwrap_err().contains("zone type"));

        let mut config = AppConfig::default();
        config.zones[0].zone_type = 128;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.zones[0].local_id = LOCAL_ZONE_MASK + 1;
        assert!(config.validate().unwrap_err().contains("local id"));

        let mut config = AppConfig::default();
        let duplicate = config.zones[0].clone();
        config.zones.push(duplicate);
        assert!(config.validate().unwrap_err().contains("Duplicate zone id"));
    }
}
