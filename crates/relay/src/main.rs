//! # studio-relay
//!
//! Signaling relay binary: loads settings, initializes logging and metrics,
//! and serves the WebSocket relay until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use relay_server::{RelayServer, ServerConfig};
use relay_settings::RelaySettings;

/// WebRTC signaling relay for guest/studio sessions.
#[derive(Parser, Debug)]
#[command(name = "studio-relay", about = "WebRTC signaling relay")]
struct Cli {
    /// Path to a JSON settings file (falls back to `RELAY_CONFIG`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings and `PORT`).
    #[arg(long)]
    port: Option<u16>,
}

impl Cli {
    /// Settings file: `--config`, else `RELAY_CONFIG`.
    fn config_path(&self) -> Option<PathBuf> {
        self.config
            .clone()
            .or_else(relay_settings::settings_path_from_env)
    }

    /// Apply command-line overrides on top of loaded settings.
    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Settings come first: they carry the log level.
    let config_path = args.config_path();
    let mut settings = relay_settings::load_settings(config_path.as_deref())
        .with_context(|| match &config_path {
            Some(path) => format!("Failed to load settings from {}", path.display()),
            None => "Failed to load settings".to_string(),
        })?;
    args.apply(&mut settings);

    relay_core::logging::init_subscriber(&settings.logging.level, settings.logging.format);
    for key in relay_settings::rejected_env_overrides() {
        tracing::warn!(key, "invalid env var ignored, using file or default value");
    }

    let mut server = RelayServer::new(ServerConfig::from(&settings));
    match relay_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => tracing::warn!(error = %e, "metrics disabled"),
    }

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        role_policy = ?settings.relay.role_policy,
        heartbeat_interval_ms = settings.heartbeat.interval_ms,
        "studio relay listening on ws://{addr}"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let drained = server.shutdown().drain(vec![handle], None).await;
    tracing::info!(
        drained,
        remaining = server.registry().total(),
        "Shutdown complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_leave_settings_alone() {
        let cli = Cli::parse_from(["studio-relay"]);
        assert!(cli.config.is_none());
        let mut settings = RelaySettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 3000);
    }

    #[test]
    fn cli_overrides_host_and_port() {
        let cli = Cli::parse_from(["studio-relay", "--host", "127.0.0.1", "--port", "8443"]);
        let mut settings = RelaySettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 8443);
    }

    #[test]
    fn cli_config_path() {
        let cli = Cli::parse_from(["studio-relay", "--config", "/etc/relay.json"]);
        assert_eq!(cli.config_path(), Some(PathBuf::from("/etc/relay.json")));
    }

    #[test]
    fn cli_rejects_invalid_port() {
        assert!(Cli::try_parse_from(["studio-relay", "--port", "70000"]).is_err());
    }
}
