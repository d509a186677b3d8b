// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # FSx for OpenZFS CSI Driver
//!
//! The `fsx-csi-driver` binary runs the CSI plugin in controller mode,
//! node mode, or both.
//!
//! ## Commands
//!
//! - `fsx-csi-driver [serve]` - Serve the CSI endpoint (default)
//! - `fsx-csi-driver config show|validate|generate` - Configuration management
//! - `fsx-csi-driver version` - Print build information as JSON
//!
//! Sidecar manifests conventionally pass `--endpoint=$(CSI_ENDPOINT)` and
//! `--node-id=$(CSI_NODE_ID)`; both flags also read those variables directly.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

use fsx_csi::commands::{self, ConfigCommand};
use fsx_csi::daemon::{self, ServeOverrides};
use fsx_csi_core::domain::node_config::DriverMode;

/// FSx for OpenZFS CSI driver
#[derive(Parser)]
#[command(name = "fsx-csi-driver")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "FSX_CSI_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// CSI endpoint, unix:///path or tcp://host:port
    #[arg(long, global = true, env = "CSI_ENDPOINT")]
    endpoint: Option<String>,

    /// Roles to serve (controller, node, all)
    #[arg(long, global = true, env = "FSX_CSI_MODE")]
    mode: Option<DriverMode>,

    /// Node id; skips instance metadata discovery when set
    #[arg(long, global = true, env = "CSI_NODE_ID")]
    node_id: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "FSX_CSI_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Serve Prometheus metrics on this address
    #[arg(long, global = true, env = "FSX_CSI_METRICS_ADDRESS")]
    metrics_address: Option<SocketAddr>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the CSI endpoint
    #[command(name = "serve")]
    Serve,

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Print driver name, version and platform as JSON
    #[command(name = "version")]
    Version,
}

impl Cli {
    fn overrides(&self) -> ServeOverrides {
        ServeOverrides {
            endpoint: self.endpoint.clone(),
            mode: self.mode,
            node_id: self.node_id.clone(),
            metrics_address: self.metrics_address,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Config { ref command }) => {
            commands::config::handle_command(command, cli.config.clone(), &cli.overrides()).await
        }
        Some(Commands::Version) => commands::version::print_version(),
        Some(Commands::Serve) | None => {
            daemon::start_driver(cli.config.clone(), cli.overrides()).await
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
