// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Subprocess provisioning tool
//!
//! Spawns the configured binary with the invocation's argument vector and a
//! cleared environment holding only the invocation's variables. The child is
//! killed if the run future is dropped, which is what happens when a
//! `DeadlineGuard` gives up on it.
//!
//! The child never sees `PATH`, so a bare program name is resolved against
//! the host's search path once, at construction.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use tracing::{debug, warn};

use crate::domain::provisioner::{ProvisioningTool, ToolError, ToolInvocation, ToolOutput};

pub struct SubprocessProvisioningTool {
    binary: PathBuf,
}

impl SubprocessProvisioningTool {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self::with_search_path(binary, std::env::var_os("PATH"))
    }

    /// Like `new`, looking bare names up in `search_path` instead of `PATH`
    pub fn with_search_path(binary: impl Into<PathBuf>, search_path: Option<OsString>) -> Self {
        let binary = binary.into();
        if !is_bare_name(&binary) {
            return Self { binary };
        }

        let cwd = std::env::current_dir().unwrap_or_default();
        match which::which_in(&binary, search_path, cwd) {
            Ok(resolved) => {
                debug!(binary = ?binary, resolved = ?resolved, "Provisioning tool resolved");
                Self { binary: resolved }
            }
            Err(e) => {
                warn!(binary = ?binary, error = %e, "Provisioning tool not found on the search path");
                Self { binary }
            }
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

fn is_bare_name(path: &Path) -> bool {
    let mut components = path.components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[async_trait]
impl ProvisioningTool for SubprocessProvisioningTool {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args(&invocation.args)
            .env_clear()
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if invocation.home_dir.is_dir() {
            cmd.current_dir(&invocation.home_dir);
        }

        debug!(
            session_id = %invocation.session_id,
            phase = %invocation.phase,
            binary = ?self.binary,
            args = ?invocation.args,
            "Spawning provisioning tool"
        );

        let output = cmd
            .output()
            .await
            .map_err(|e| ToolError::Spawn(format!("{}: {}", self.binary.display(), e)))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(ToolError::Failed {
                phase: invocation.phase,
                code: output.status.code(),
                output: combined,
            });
        }

        Ok(ToolOutput { output: combined })
    }
}
