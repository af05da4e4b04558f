// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Provisioning tool contract
//!
//! The cluster provisioning tool is an opaque external program driven
//! through a fixed argument vector per phase. Credentials travel through the
//! environment and every session gets its own home directory, where the tool
//! leaves its generated cluster config.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::domain::session::{SessionId, SessionRecord};

/// File name of the SSH public key inside the session home directory
pub const SSH_KEY_FILE: &str = "id.pub";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolPhase {
    Create,
    Update,
    RollingUpdate,
    Validate,
    Delete,
}

impl fmt::Display for ToolPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ToolPhase::Create => "create",
            ToolPhase::Update => "update",
            ToolPhase::RollingUpdate => "rolling-update",
            ToolPhase::Validate => "validate",
            ToolPhase::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// One fully described tool run
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub session_id: SessionId,
    pub phase: ToolPhase,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub home_dir: PathBuf,
    pub deadline: Duration,
}

impl ToolInvocation {
    /// Build the invocation for `phase` from the current record fields
    pub fn for_phase(
        phase: ToolPhase,
        id: &SessionId,
        record: &SessionRecord,
        home_dir: &Path,
        deadline: Duration,
    ) -> Self {
        Self {
            session_id: id.clone(),
            phase,
            args: phase_arguments(phase, record, home_dir),
            env: tool_environment(record, home_dir),
            home_dir: home_dir.to_path_buf(),
            deadline,
        }
    }
}

/// Combined stdout and stderr of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub output: String,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Failed to start provisioning tool: {0}")]
    Spawn(String),
    #[error("Provisioning tool {phase} exited with {code:?}")]
    Failed {
        phase: ToolPhase,
        code: Option<i32>,
        output: String,
    },
    #[error("Provisioning tool {phase} exceeded its {deadline:?} deadline")]
    Timeout { phase: ToolPhase, deadline: Duration },
    #[error("Provisioning tool I/O error: {0}")]
    Io(String),
}

impl ToolError {
    /// Captured output, when the tool got far enough to produce any
    pub fn output(&self) -> Option<&str> {
        match self {
            ToolError::Failed { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Runs the provisioning tool. Implementations do not enforce the deadline;
/// callers wrap them in a `DeadlineGuard`.
#[async_trait]
pub trait ProvisioningTool: Send + Sync {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError>;
}

/// Reaction to a tool run exceeding its deadline.
///
/// The production handler terminates the whole host process: the tool has
/// no cancellation of its own and a hung run must never block the host.
pub trait TimeoutHandler: Send + Sync {
    fn on_timeout(&self, invocation: &ToolInvocation);
}

fn state_url(record: &SessionRecord) -> String {
    format!("s3://{}", record.bucket)
}

fn phase_arguments(phase: ToolPhase, record: &SessionRecord, home_dir: &Path) -> Vec<String> {
    let name = format!("--name={}", record.cluster_name());
    let state = format!("--state={}", state_url(record));

    match phase {
        ToolPhase::Create => {
            let mut args: Vec<String> = [
                "create",
                "cluster",
                "--admin-access=0.0.0.0/0",
                "--api-loadbalancer-type=public",
                "--associate-public-ip=true",
                "--authorization=AlwaysAllow",
                "--channel=stable",
                "--cloud=aws",
                "--dns=public",
                "--model=config,proto,cloudup",
                "--ssh-access=0.0.0.0/0",
                "--target=direct",
                "--topology=public",
                "--yes",
                "--networking=kubenet",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect();

            args.extend([
                format!("--zones={}", record.nodes.zones.join(",")),
                name,
                state,
                format!("--master-count={}", record.master.quantity),
                format!("--master-size={}", record.master.machine_type),
                format!("--master-volume-size={}", record.master.storage_size),
                format!("--master-zones={}", record.master.zones.join(",")),
                format!("--node-count={}", record.nodes.quantity),
                format!("--node-size={}", record.nodes.machine_type),
                format!("--node-volume-size={}", record.nodes.storage_size),
                format!("--ssh-public-key={}", home_dir.join(SSH_KEY_FILE).display()),
                "--logtostderr".to_string(),
            ]);
            args
        }
        ToolPhase::Update => vec![
            "update".to_string(),
            "cluster".to_string(),
            "--yes".to_string(),
            name,
            state,
        ],
        ToolPhase::RollingUpdate => vec![
            "rolling-update".to_string(),
            "cluster".to_string(),
            "--yes".to_string(),
            "--force".to_string(),
            "--master-interval=5m0s".to_string(),
            "--node-interval=2m0s".to_string(),
            name,
            state,
        ],
        ToolPhase::Validate => vec![
            "validate".to_string(),
            "cluster".to_string(),
            name,
            state,
        ],
        ToolPhase::Delete => vec![
            "delete".to_string(),
            "cluster".to_string(),
            name,
            state,
            "--yes".to_string(),
        ],
    }
}

fn tool_environment(record: &SessionRecord, home_dir: &Path) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("HOME".to_string(), home_dir.display().to_string()),
        ("AWS_ACCESS_KEY".to_string(), record.access_key.clone()),
        ("AWS_SECRET_KEY".to_string(), record.secret_key.clone()),
    ])
}
