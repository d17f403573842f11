//! Main application logic and lifecycle management.
//!
//! This module contains the `Application` struct that orchestrates server
//! startup, periodic statistics logging, and graceful shutdown.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    logging::display_banner,
    signals::{setup_signal_handlers, setup_signal_handlers_silent},
};
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{error, info, warn};
use zone_server::ZoneServer;
use zone_system::{ShutdownState, ZoneRegistryStats};

/// Interval between periodic statistics reports.
const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Main application struct.
///
/// Manages the lifecycle of a zone host node: configuration loading, server
/// initialization, statistics reporting and graceful shutdown.
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    /// Zone server instance
    server: Arc<ZoneServer>,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// # Process
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration
    /// 4. Display startup banner
    /// 5. Initialize the zone server and join the cluster
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        apply_overrides(&mut config, &args);

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        } else {
            info!("✅ Configuration loaded and validated successfully");
        }

        display_banner();

        let server_config = config.to_server_config()?;
        let server = ZoneServer::new(server_config).await?;

        info!(
            "📂 Config: {} | Node: {} | Zones: {}",
            args.config_path.display(),
            config.node.name,
            config.zones.len()
        );

        Ok(Self {
            config,
            server: Arc::new(server),
        })
    }

    /// Runs the application until a shutdown signal arrives.
    ///
    /// # Shutdown Phases
    ///
    /// 1. Stop the accept loop
    /// 2. Shut down every hosted zone and leave the cluster
    /// 3. Log final statistics
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting zonehost node '{}'", self.config.node.name);
        self.log_configuration_summary();

        let shutdown_state = ShutdownState::new();

        let server_handle = {
            let server = self.server.clone();
            let shutdown_state = shutdown_state.clone();
            tokio::spawn(async move {
                match server.start_with_shutdown_state(shutdown_state).await {
                    Ok(()) => info!("✅ Server completed successfully"),
                    Err(e) => {
                        error!("❌ Server error: {:?}", e);
                        std::process::exit(1);
                    }
                }
            })
        };

        let monitoring_handle = {
            let server = self.server.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(STATS_INTERVAL);
                // The first tick completes immediately
                interval.tick().await;
                let mut last = server.stats();

                loop {
                    interval.tick().await;
                    let stats = server.stats();
                    let connections = server.connection_count().await;
                    log_period_statistics(&last, &stats, connections);
                    last = stats;
                }
            })
        };

        info!("✅ zonehost is now running!");
        info!(
            "🎮 Ready to accept connections on {}",
            self.config.server.bind_address
        );
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        let signal_shutdown_state = setup_signal_handlers().await?;

        // A second signal skips the graceful path
        tokio::spawn(async move {
            if let Err(e) = setup_signal_handlers_silent().await {
                error!("Failed to set up merciless shutdown signal handler: {e}");
                return;
            }

            warn!("Shutdown handler received again! I'll make this quick.");
            std::process::exit(1);
        });

        if signal_shutdown_state.is_shutdown_initiated() {
            shutdown_state.initiate_shutdown();
        }

        info!("🛑 Shutdown signal received, beginning graceful shutdown...");
        monitoring_handle.abort();

        info!("📡 Phase 1: Stopping accept loop...");
        match tokio::time::timeout(Duration::from_secs(8), server_handle).await {
            Ok(_) => info!("✅ Server task completed gracefully"),
            Err(_) => warn!("⏰ Server task did not complete within timeout, proceeding with cleanup"),
        }

        info!("📴 Phase 2: Shutting down hosted zones...");
        if let Err(e) = self.server.shutdown().await {
            error!("❌ Zone shutdown failed: {}", e);
        } else {
            info!("✅ All zones released");
        }
        shutdown_state.complete_shutdown();

        log_final_statistics(&self.server.stats());

        info!("✅ zonehost shutdown complete");
        Ok(())
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", self.config.server.bind_address);
        info!(
            "  🏷️ Node: {} (public {}:{})",
            self.config.node.name, self.config.node.public_host, self.config.node.public_port
        );
        info!("  🗺️ Configured zones: {}", self.config.zones.len());
        info!(
            "  👥 Max connections: {}",
            self.config.server.max_connections
        );
        info!(
            "  ⏱️ Resolution timeout: {}s | Lock wait: {}ms",
            self.config.movement.resolution_timeout_secs, self.config.movement.lock_wait_ms
        );
    }
}

/// Applies command-line overrides to the loaded configuration.
fn apply_overrides(config: &mut AppConfig, args: &CliArgs) {
    if let Some(bind_address) = &args.bind_address {
        config.server.bind_address = bind_address.clone();
    }

    if let Some(node_name) = &args.node_name {
        config.node.name = node_name.clone();
    }

    if let Some(log_level) = &args.log_level {
        config.logging.level = log_level.clone();
    }

    if args.json_logs {
        config.logging.json_format = true;
    }
}

fn log_period_statistics(last: &ZoneRegistryStats, stats: &ZoneRegistryStats, connections: usize) {
    let moves = stats.moves_requested.saturating_sub(last.moves_requested);
    info!(
        "📊 Node Health - {} moves/min | {} failed | {} switches | {} zones hosted | {} connections",
        moves,
        stats.moves_failed.saturating_sub(last.moves_failed),
        stats.server_switches.saturating_sub(last.server_switches),
        stats.hosted_zones,
        connections
    );
}

fn log_final_statistics(stats: &ZoneRegistryStats) {
    info!("📊 Final Statistics:");
    info!("  - Moves requested: {}", stats.moves_requested);
    info!("  - Moves succeeded: {}", stats.moves_succeeded);
    info!("  - Moves vetoed: {}", stats.moves_vetoed);
    info!("  - Server switches: {}", stats.server_switches);
    info!("  - Zones resolved: {}", stats.zones_resolved);
}
