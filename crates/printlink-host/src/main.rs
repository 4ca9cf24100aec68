//! PrintLink host diagnostic CLI.
//!
//! Drives the method-channel facade directly against the real network
//! provider, which is handy for checking a printer from a terminal without
//! the app.  Results are printed to stdout as JSON; logs go to stderr.
//!
//! # Usage
//!
//! ```text
//! printlink-host [--config <FILE>] [--log-level <LEVEL>] <COMMAND>
//!
//! Commands:
//!   discover  Run one network discovery and print the printers found
//!   send      Connect to a printer, send commands, and disconnect
//! ```
//!
//! Examples:
//!
//! ```text
//! printlink-host discover --subnet 192.168.1.*
//! printlink-host send --address 192.168.1.40:9100 --commands '~WC'
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

use printlink_core::MethodResult;
use printlink_host::infrastructure::provider::desktop::DesktopPermissions;
use printlink_host::infrastructure::provider::network::NetworkProvider;
use printlink_host::infrastructure::storage::config::{load_config, load_config_from};
use printlink_host::infrastructure::ui_bridge::PluginFacade;

// ── CLI argument definitions ──────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "printlink-host",
    about = "Discover and talk to network label printers from the command line",
    version
)]
struct Cli {
    /// Config file to load instead of the platform default.
    #[arg(long, env = "PRINTLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is unset.  Overrides the config file.
    #[arg(long, env = "PRINTLINK_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one network discovery.
    Discover {
        /// Sweep a subnet range such as `192.168.1.*` or `10.0.0.10-20`.
        #[arg(long, conflicts_with = "hops")]
        subnet: Option<String>,

        /// Use multicast discovery with this many hops.
        #[arg(long)]
        hops: Option<u32>,
    },
    /// Connect, send a command string, and disconnect.
    Send {
        /// `host` or `host:port`; the port defaults to 9100.
        #[arg(long)]
        address: String,

        /// Raw command text, sent as UTF-8.
        #[arg(long)]
        commands: String,

        /// Connect timeout in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

impl Command {
    /// The facade calls this command expands to, in order.
    fn calls(&self) -> Vec<(&'static str, Value)> {
        match self {
            Command::Discover {
                subnet: Some(range),
                ..
            } => vec![("discoverSubnetSearch", json!({ "subnetRange": range }))],
            Command::Discover {
                hops: Some(hops), ..
            } => vec![("discoverMulticastPrinters", json!({ "hops": hops }))],
            Command::Discover { .. } => vec![("discoverPrinters", Value::Null)],
            Command::Send {
                address,
                commands,
                timeout_ms,
            } => vec![
                (
                    "connect",
                    json!({
                        "interfaceType": "tcp",
                        "identifier": address,
                        "timeout": timeout_ms,
                    }),
                ),
                ("sendCommands", json!({ "commands": commands })),
                ("disconnect", Value::Null),
            ],
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => load_config().context("failed to load config")?,
    };

    // Logs go to stderr so stdout stays clean JSON.
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.host.log_level.clone());
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let facade = PluginFacade::new(
        Arc::new(NetworkProvider::new()),
        Arc::new(DesktopPermissions),
        &config,
    );

    let run = async {
        for (method, args) in cli.command.calls() {
            info!(method, "calling");
            match facade.handle(method, &args).await {
                MethodResult::Success { value } => {
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
                MethodResult::Error { code, message } => {
                    bail!("{method} failed: {code}: {message}");
                }
            }
        }
        Ok(())
    };

    let outcome = tokio::select! {
        outcome = run => outcome,
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C; stopping");
            Ok(())
        }
    };

    facade.shutdown().await;
    outcome
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_discover_uses_local_broadcast() {
        let cli = Cli::parse_from(["printlink-host", "discover"]);

        let calls = cli.command.calls();

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "discoverPrinters");
    }

    #[test]
    fn test_subnet_discover_passes_range() {
        let cli = Cli::parse_from(["printlink-host", "discover", "--subnet", "10.0.0.*"]);

        let calls = cli.command.calls();

        assert_eq!(calls[0].0, "discoverSubnetSearch");
        assert_eq!(calls[0].1["subnetRange"], "10.0.0.*");
    }

    #[test]
    fn test_subnet_and_hops_conflict() {
        let parsed = Cli::try_parse_from([
            "printlink-host",
            "discover",
            "--subnet",
            "10.0.0.*",
            "--hops",
            "2",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_send_expands_to_connect_send_disconnect() {
        let cli = Cli::parse_from([
            "printlink-host",
            "send",
            "--address",
            "10.0.0.5",
            "--commands",
            "~WC",
            "--timeout-ms",
            "2500",
        ]);

        let calls = cli.command.calls();
        let methods: Vec<&str> = calls.iter().map(|(m, _)| *m).collect();

        assert_eq!(methods, vec!["connect", "sendCommands", "disconnect"]);
        assert_eq!(calls[0].1["timeout"], 2500);
        assert_eq!(calls[1].1["commands"], "~WC");
    }

    #[test]
    fn test_config_flag_is_optional() {
        let cli = Cli::parse_from(["printlink-host", "discover"]);
        assert!(cli.config.is_none());
        assert!(cli.log_level.is_none());
    }
}
