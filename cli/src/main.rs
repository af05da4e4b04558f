// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Kuberstack installer
//!
//! The `kuberstack` binary serves the installer wizard API and offers a few
//! operator commands.
//!
//! ## Commands
//!
//! - `kuberstack serve` - Run the installer service
//! - `kuberstack config show|validate|generate` - Configuration management
//! - `kuberstack sweep` - Remove expired sessions once, offline

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

use kuberstack::commands::{self, ConfigCommand, SweepCommand};
use kuberstack::server;
use kuberstack_core::domain::installer_config::InstallerConfigManifest;

/// Kuberstack installer - provision Kubernetes clusters from a web wizard
#[derive(Parser)]
#[command(name = "kuberstack")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "KUBERSTACK_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "KUBERSTACK_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, env = "KUBERSTACK_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the installer service
    #[command(name = "serve")]
    Serve {
        /// HTTP bind address (overrides spec.network.bind_address)
        #[arg(long, env = "KUBERSTACK_HOST")]
        host: Option<String>,

        /// HTTP port (overrides spec.network.port)
        #[arg(long, env = "KUBERSTACK_PORT")]
        port: Option<u16>,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Remove expired sessions from the store
    #[command(name = "sweep")]
    Sweep {
        #[command(flatten)]
        command: SweepCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_format)?;

    match cli.command {
        Some(Commands::Serve { host, port }) => {
            let mut config = InstallerConfigManifest::load_or_default(cli.config)
                .context("Failed to load configuration")?;
            if let Some(host) = host {
                config.spec.network.bind_address = host;
            }
            if let Some(port) = port {
                config.spec.network.port = port;
            }
            info!("Starting Kuberstack installer");
            server::run(config).await
        }
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::Sweep { command }) => commands::sweep::execute(command, cli.config).await,
        None => {
            // No command provided - show help
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Pretty => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }

    Ok(())
}
