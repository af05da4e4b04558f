// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! One-off sweep of expired sessions
//!
//! Opens the store directly, so the service must not be running against the
//! same path: the embedded database takes an exclusive lock.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use kuberstack_core::domain::installer_config::InstallerConfigManifest;
use kuberstack_core::domain::repository::SessionStore;
use kuberstack_core::domain::session::SessionId;
use kuberstack_core::infrastructure::SledSessionStore;

#[derive(Args)]
pub struct SweepCommand {
    /// Store path (default: spec.store.path from configuration)
    #[arg(long, value_name = "DIR")]
    pub store: Option<PathBuf>,
}

pub async fn execute(command: SweepCommand, config_override: Option<PathBuf>) -> Result<()> {
    let config = InstallerConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;

    let path = command.store.unwrap_or(config.spec.store.path.clone());
    let removed = sweep_store(&config, path).await?;

    if removed.is_empty() {
        println!("{}", "No expired sessions".dimmed());
    } else {
        for id in &removed {
            println!("  removed {}", id);
        }
        println!(
            "{}",
            format!("✓ Removed {} expired session(s)", removed.len()).green()
        );
    }
    Ok(())
}

async fn sweep_store(config: &InstallerConfigManifest, path: PathBuf) -> Result<Vec<SessionId>> {
    let store = SledSessionStore::open(&path, config.spec.store.ttl, config.spec.store.file_mode)
        .with_context(|| format!("Failed to open session store at {:?}", path))?;

    let removed = store.cleanup().await.context("Sweep failed")?;
    store.close().await.context("Failed to close session store")?;
    Ok(removed)
}
