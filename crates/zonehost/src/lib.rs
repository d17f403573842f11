//! # zonehost - Zone Host Node
//!
//! Runs one node of a zone cluster: a WebSocket server that moves clients
//! between zones and scenes, publishes the zones it hosts, and hands clients
//! off to the node hosting a zone when that is not this node.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! zonehost
//!
//! # Specify custom configuration
//! zonehost --config harbor.toml
//!
//! # Override specific settings
//! zonehost --bind 0.0.0.0:8080 --node-name harbor-2 --log-level debug
//!
//! # JSON logging for production
//! zonehost --json-logs
//! ```
//!
//! ## Configuration
//!
//! The host loads configuration from a TOML file (default: `config.toml`).
//! If the file doesn't exist, a default configuration will be created.
//!
//! ## Signal Handling
//!
//! The host shuts down gracefully on SIGINT (Ctrl+C) and SIGTERM on Unix
//! systems. Hosted zones are shut down and released before exit.

use tracing::error;

mod app;
mod cli;
mod config;
mod logging;
mod signals;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Runs the zone host.
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Load configuration to get logging settings
    let config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();

    let mut logging_settings = config.logging.clone();
    if let Some(level) = &args.log_level {
        logging_settings.level = level.clone();
    }
    if let Err(e) = logging::setup_logging(&logging_settings, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}

// Re-export main types for potential library usage
pub use config::{LoggingSettings, MovementSettings, NodeSettings, ServerSettings};
