//! # pulse-agent
//!
//! Pulse server binary: loads settings, installs logging and metrics, and
//! serves the hub until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pulse_server::{PulseServer, ServerConfig};
use pulse_settings::PulseSettings;

/// Pulse real-time post broadcaster.
#[derive(Parser, Debug)]
#[command(name = "pulse", about = "Pulse WebSocket broadcast server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.pulse/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter such as `debug` or `pulse_server=trace` (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn load_settings(&self) -> Result<PulseSettings> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(pulse_settings::settings_path);
        pulse_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))
    }

    /// Settings with CLI flags applied on top.
    fn apply(&self, mut settings: PulseSettings) -> PulseSettings {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if self.json {
            settings.logging.json = true;
        }
        settings
    }

    fn log_filter(&self, settings: &PulseSettings) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| settings.logging.level.as_filter_str().to_owned())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.apply(args.load_settings()?);

    let filter = args.log_filter(&settings);
    if settings.logging.json {
        pulse_core::logging::init_json_subscriber(&filter);
    } else {
        pulse_core::logging::init_subscriber(&filter);
    }

    let metrics = pulse_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let config = ServerConfig::from(&settings.server);
    let server = PulseServer::new(config, metrics);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("Pulse listening on http://{addr} (ws://{addr}/ws)");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.stop().await;
    let _ = handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
