//! # Realm World Server - Main Entry Point
//!
//! Process bootstrap for the world server: CLI parsing, configuration
//! loading, logging setup and application lifecycle management.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! worldd
//!
//! # Specify custom configuration
//! worldd --config production.toml
//!
//! # Override specific settings
//! worldd --bind 0.0.0.0:8085 --map-threads 4 --log-level debug
//!
//! # JSON logging for production
//! worldd --json-logs
//! ```
//!
//! ## Configuration
//!
//! The server loads configuration from a TOML file (default: `config.toml`).
//! If the file doesn't exist, a default configuration will be created.
//!
//! ## Signal Handling
//!
//! The server handles graceful shutdown on:
//! - SIGINT (Ctrl+C)
//! - SIGTERM (Unix systems)

use tracing::error;

pub mod app;
pub mod cli;
pub mod config;
pub mod logging;
pub mod signals;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Runs the world server process.
///
/// Handles the complete application lifecycle including:
/// 1. Command-line argument parsing
/// 2. Configuration loading and validation
/// 3. Logging system initialization
/// 4. Application creation and execution
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Load configuration to get logging settings
    let mut config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();
    config.apply_overrides(&args);

    if let Err(e) = logging::setup_logging(&config.logging, args.json_logs) {
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

pub use config::{LoggingSettings, ServerSettings};

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());

        let server_config = config
            .to_server_config()
            .expect("Default config should convert to ServerConfig");
        assert_eq!(server_config.max_connections, 1000);
        assert_eq!(server_config.connection_timeout, 60);
        assert_eq!(server_config.world.maps.len(), 1);
    }

    #[tokio::test]
    async fn test_application_creation() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("test_config.toml");
        let args = CliArgs::try_parse_from([
            "worldd".to_string(),
            "--config".to_string(),
            config_path.display().to_string(),
            "--bind".to_string(),
            "127.0.0.1:0".to_string(),
        ])
        .unwrap();

        let app = Application::new(args).await;
        assert!(app.is_ok());
        // The default configuration was written for next time.
        assert!(config_path.exists());
    }

    #[tokio::test]
    async fn test_application_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("bad.toml");
        let mut config = AppConfig::default();
        config.world.start.map = 99;
        let toml_content = toml::to_string_pretty(&config).unwrap();
        tokio::fs::write(&config_path, toml_content).await.unwrap();

        let args = CliArgs::try_parse_from(["worldd".to_string(), "-c".to_string(), config_path.display().to_string()])
            .unwrap();
        assert!(Application::new(args).await.is_err());
    }
}
