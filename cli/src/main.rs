//! OCPP charger simulator - CLI server
//!
//! ```sh
//! # Run with default config (~/.config/ocpp-sim/config.toml)
//! ocpp-sim
//!
//! # Point the fleet at another Central System and pre-create two chargers
//! ocpp-sim --central-system-url ws://csms.local:9000/ocpp --charger CP1 --charger CP2
//!
//! # Validate config without starting
//! ocpp-sim --check
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use ocpp_sim::config::{AppConfig, LoggingConfig};
use ocpp_sim::server::{init_tracing, ServerHandle, ServerOptions};

/// OCPP 1.6 charge point fleet simulator.
#[derive(Parser, Debug)]
#[command(
    name = "ocpp-sim",
    version,
    about = "Simulated OCPP 1.6 charge points driven over HTTP",
    long_about = "Runs a fleet of simulated OCPP 1.6 charge points, each with its own \
                  WebSocket connection to a Central System, controlled through a REST API.\n\n\
                  Default config: ~/.config/ocpp-sim/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "OCPP_SIM_CONFIG")]
    config: Option<PathBuf>,

    /// Override the HTTP API listen port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the Central System base URL (charger id is appended).
    #[arg(long)]
    central_system_url: Option<String>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration and exit without starting.
    #[arg(long)]
    check: bool,

    /// Charger to create at startup; repeatable.
    #[arg(long = "charger", value_name = "ID")]
    chargers: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // ── Load configuration ─────────────────────────────────────
    let config_path = cli.config.unwrap_or_else(ocpp_sim::default_config_path);

    let mut config = match AppConfig::load(&config_path) {
        Ok(cfg) => {
            let mut logging = cfg.logging.clone();
            if let Some(ref level) = cli.log_level {
                logging.level = level.clone();
            }
            init_tracing(&logging);
            info!("Configuration loaded from {}", config_path.display());
            cfg
        }
        Err(e) => {
            init_tracing(&LoggingConfig::default());
            error!("Failed to load config from {}: {}", config_path.display(), e);
            if cli.check {
                return Err(e.into());
            }
            error!("Using default configuration.");
            AppConfig::default()
        }
    };

    // ── Apply CLI overrides ────────────────────────────────────
    if let Some(port) = cli.port {
        info!("CLI override: port = {}", port);
        config.server.port = port;
    }
    if let Some(url) = cli.central_system_url {
        info!("CLI override: central_system.url = {}", url);
        config.central_system.url = url;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.validate()?;

    // ── Config validation mode ─────────────────────────────────
    if cli.check {
        println!("✅ Configuration is valid");
        println!("   Config file    : {}", config_path.display());
        println!("   HTTP address   : {}", config.server.address());
        println!("   Central System : {}", config.central_system.url);
        println!(
            "   Heartbeat/meter: {}ms / {}ms",
            config.simulation.heartbeat_interval_ms, config.simulation.meter_sample_interval_ms
        );
        println!("   Log level      : {}", config.logging.level);
        return Ok(());
    }

    // ── Start server ───────────────────────────────────────────
    let handle = ServerHandle::start(ServerOptions {
        config,
        chargers: cli.chargers,
        connector: None,
    })
    .await?;

    handle.install_signal_handler();
    info!("🚀 Press Ctrl+C to shutdown gracefully.");

    handle.wait().await;
    Ok(())
}
