//! Main application logic and lifecycle management.
//!
//! This module contains the core `Application` struct that orchestrates
//! server startup, monitoring, and the phased shutdown.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    logging::display_banner,
    signals::{setup_signal_handlers, setup_signal_handlers_silent},
};
use std::sync::Arc;
use tokio::time::{interval, timeout, Duration};
use tracing::{error, info, warn};
use world_server::{security::SecurityManager, SessionManager, WorldServer};
use world_sim::ShutdownState;

/// How long the world may take to drain after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

const HEALTH_REPORT_INTERVAL: Duration = Duration::from_secs(60);

/// Main application struct.
///
/// The `Application` struct manages the complete lifecycle of the world
/// server: configuration, server construction, health reporting and
/// graceful shutdown.
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    /// World server instance
    server: WorldServer,
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
    /// 5. Build the world server
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;
        config.apply_overrides(&args);

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();

        let server = WorldServer::new(config.to_server_config()?);
        Ok(Self { config, server })
    }

    /// Runs the server until a termination signal, then shuts down in
    /// phases.
    ///
    /// # Shutdown Phases
    ///
    /// 1. Stop accepting sockets and reading packets
    /// 2. Let the world run what is already queued and tick once more
    /// 3. Close every session
    ///
    /// A second signal during shutdown exits immediately.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting realm world server");
        self.log_configuration_summary();

        let sessions = self.server.sessions();
        let security = self.server.security();
        let shutdown_state = ShutdownState::new();

        let mut server_handle = {
            let server = self.server;
            let shutdown_state = shutdown_state.clone();
            tokio::spawn(async move { server.start_with_shutdown_state(shutdown_state).await })
        };

        let monitoring_handle = tokio::spawn(report_health(Arc::clone(&sessions), Arc::clone(&security)));

        info!("✅ World server is now running!");
        info!("🎮 Ready to accept connections on {}", self.config.server.bind_address);
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        tokio::select! {
            signal = setup_signal_handlers(&shutdown_state) => signal?,
            finished = &mut server_handle => {
                // The server only returns on its own when startup failed.
                monitoring_handle.abort();
                return match finished {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e.into()),
                    Err(e) => Err(format!("server task failed: {e}").into()),
                };
            }
        }

        // merciless shutdown
        tokio::spawn(async move {
            if let Err(e) = setup_signal_handlers_silent().await {
                error!("Failed to set up merciless shutdown signal handler: {e}");
                return;
            }
            warn!("Shutdown handler received again! I'll make this quick.");
            std::process::exit(1);
        });

        monitoring_handle.abort();
        info!("⏳ Draining queued packets...");

        match timeout(DRAIN_TIMEOUT, &mut server_handle).await {
            Ok(Ok(Ok(()))) => info!("✅ Server task completed gracefully"),
            Ok(Ok(Err(e))) => error!("❌ Server error during shutdown: {}", e),
            Ok(Err(e)) => error!("❌ Server task failed: {}", e),
            Err(_) => {
                warn!("⏰ World did not drain within {:?}, closing anyway", DRAIN_TIMEOUT);
                server_handle.abort();
                for id in sessions.session_ids() {
                    sessions.remove(id);
                }
            }
        }

        log_final_statistics(&sessions, &security).await;
        info!("✅ Realm world server shutdown complete");
        Ok(())
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        let server = &self.config.server;
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", server.bind_address);
        if let Some(port) = server.instance_port {
            info!("  🔀 Instance port: {}", port);
        }
        info!("  👥 Max connections: {}", server.max_connections);
        info!("  ⏱️ Connection timeout: {}s", server.connection_timeout);
        info!(
            "  🕒 Tick: {}ms, map threads: {}",
            server.tick_interval_ms,
            if server.map_update_threads == 0 {
                num_cpus::get()
            } else {
                server.map_update_threads
            }
        );
        info!(
            "  🗺️ World: {} map(s), {} template(s), {} spawn(s)",
            self.config.world.maps.len(),
            self.config.world.templates.len(),
            self.config.world.spawns.len()
        );
    }
}

async fn report_health(sessions: Arc<SessionManager>, security: Arc<SecurityManager>) {
    let mut ticker = interval(HEALTH_REPORT_INTERVAL);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let stats = security.get_stats().await;
        info!(
            "📊 System Health - {} session(s) | {} tracked IP(s) | {} packet(s) rate limited",
            sessions.len(),
            stats.tracked_ips,
            stats.rate_limited_packets
        );
    }
}

/// Logs final statistics during shutdown.
async fn log_final_statistics(sessions: &SessionManager, security: &SecurityManager) {
    let stats = security.get_stats().await;
    info!("📊 Final Statistics:");
    info!("  - Sessions still open: {}", sessions.len());
    info!("  - Packets rate limited: {}", stats.rate_limited_packets);
}
