//! PrintLink method-channel bridge: entry point.
//!
//! The application launches this binary and talks to it over stdin/stdout,
//! one JSON frame per line.  Calls are dispatched to the plugin facade
//! backed by the network provider; every call gets exactly one response.
//!
//! # Usage
//!
//! ```text
//! printlink-bridge [OPTIONS]
//!
//! Options:
//!   --config <FILE>             Config file [default: platform config dir]
//!   --log-level <LEVEL>         Log level when RUST_LOG is unset
//!   --workers <N>               Concurrent operations [default: from config]
//!   --drain-timeout-secs <SECS> Wait for in-flight calls on exit [default: 5]
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable                  | Description                          |
//! |---------------------------|--------------------------------------|
//! | `PRINTLINK_CONFIG`        | Config file path                     |
//! | `PRINTLINK_LOG_LEVEL`     | Log level                            |
//! | `PRINTLINK_WORKERS`       | Concurrent operations                |
//! | `PRINTLINK_DRAIN_TIMEOUT` | Drain timeout in seconds             |
//!
//! Logs always go to stderr: stdout belongs to the protocol.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use printlink_bridge::domain::BridgeConfig;
use printlink_bridge::infrastructure::run_server;
use printlink_host::infrastructure::provider::desktop::DesktopPermissions;
use printlink_host::infrastructure::provider::network::NetworkProvider;
use printlink_host::infrastructure::storage::config::{load_config, load_config_from};
use printlink_host::infrastructure::ui_bridge::PluginFacade;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// PrintLink method-channel bridge.
#[derive(Debug, Parser)]
#[command(
    name = "printlink-bridge",
    about = "Newline-delimited JSON method channel for PrintLink",
    version
)]
struct Cli {
    /// Config file to load instead of the platform default.
    #[arg(long, env = "PRINTLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is unset.  Overrides the config file.
    #[arg(long, env = "PRINTLINK_LOG_LEVEL")]
    log_level: Option<String>,

    /// Maximum number of operations running at once.
    #[arg(long, env = "PRINTLINK_WORKERS")]
    workers: Option<usize>,

    /// Seconds to wait for in-flight operations after stdin closes.
    #[arg(long, default_value_t = 5, env = "PRINTLINK_DRAIN_TIMEOUT")]
    drain_timeout_secs: u64,
}

impl Cli {
    /// Loads the config file and applies the CLI overrides on top.
    fn into_bridge_config(self) -> anyhow::Result<(BridgeConfig, Option<String>)> {
        let mut app = match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => load_config().context("failed to load config")?,
        };
        if let Some(workers) = self.workers {
            app.workers.max_concurrent = workers;
        }

        let mut config = BridgeConfig::from_app(app);
        config.drain_timeout = Duration::from_secs(self.drain_timeout_secs);
        Ok((config, self.log_level))
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, log_level) = Cli::parse().into_bridge_config()?;

    let level = log_level.unwrap_or_else(|| config.app.host.log_level.clone());
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    info!("PrintLink bridge starting");

    let facade = Arc::new(PluginFacade::new(
        Arc::new(NetworkProvider::new()),
        Arc::new(DesktopPermissions),
        &config.app,
    ));

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => tracing::error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    run_server(config, facade, running).await?;

    info!("PrintLink bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
