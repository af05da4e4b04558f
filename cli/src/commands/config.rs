// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use kuberstack_core::domain::installer_config::InstallerConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file holding every default
    Generate {
        /// Output path (default: ./kuberstack-config.yaml)
        #[arg(short, long, default_value = "./kuberstack-config.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, force } => generate(output, force).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = InstallerConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. KUBERSTACK_CONFIG_PATH: {}",
            std::env::var("KUBERSTACK_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./kuberstack-config.yaml");
        println!("  4. ~/.kuberstack/config.yaml");
        println!("  5. /etc/kuberstack/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    let spec = &config.spec;

    println!("{}", "Session Store:".bold());
    println!("  Path: {}", spec.store.path.display());
    println!("  TTL: {}", humanize(spec.store.ttl));
    println!("  Sweep interval: {}", humanize(spec.store.sweep_interval));
    println!("  File mode: {:o}", spec.store.file_mode);
    println!();

    println!("{}", "Provisioner:".bold());
    println!("  Tool: {}", spec.provisioner.tool_path.display());
    println!("  Work dir: {}", spec.provisioner.work_dir.display());
    println!("  Phase timeout: {}", humanize(spec.provisioner.phase_timeout));
    println!("  Rolling update: {}", spec.provisioner.rolling_update);
    println!();

    println!("{}", "Network:".bold());
    println!(
        "  Listen: {}:{}",
        spec.network.bind_address, spec.network.port
    );
    println!();

    println!("{}", "Cloud:".bold());
    println!("  Backend: {:?}", spec.cloud.backend);
    if spec.cloud.backend.is_simulated() {
        println!("  {}", "simulated, no real cloud resources are touched".yellow());
    }
    println!();

    if let Some(logging) = spec.observability.as_ref().and_then(|o| o.logging.as_ref()) {
        println!("{}", "Logging:".bold());
        println!("  Level: {}", logging.level);
        println!("  Format: {}", logging.format);
        println!();
    }

    Ok(())
}

fn humanize(duration: std::time::Duration) -> String {
    humantime_serde::re::humantime::format_duration(duration).to_string()
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = InstallerConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());
    if config.spec.cloud.backend.is_simulated() {
        println!(
            "{}",
            format!(
                "! Cloud backend '{:?}' is simulated: teardown will not delete real DNS zones or buckets",
                config.spec.cloud.backend
            )
            .yellow()
        );
    }

    Ok(())
}

async fn generate(output: PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            output.display()
        );
    }

    InstallerConfigManifest::default()
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
