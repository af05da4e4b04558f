// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Deadline enforcement for provisioning tool runs.

use std::sync::Arc;
use tracing::debug;

use crate::domain::provisioner::{
    ProvisioningTool, TimeoutHandler, ToolError, ToolInvocation, ToolOutput,
};

/// Runs the tool under the invocation's wall-clock deadline and hands an
/// overrun to the timeout handler. The tool future is dropped on overrun,
/// which kills a subprocess child.
#[derive(Clone)]
pub struct DeadlineGuard {
    tool: Arc<dyn ProvisioningTool>,
    on_timeout: Arc<dyn TimeoutHandler>,
}

impl DeadlineGuard {
    pub fn new(tool: Arc<dyn ProvisioningTool>, on_timeout: Arc<dyn TimeoutHandler>) -> Self {
        Self { tool, on_timeout }
    }

    pub async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        match tokio::time::timeout(invocation.deadline, self.tool.run(invocation)).await {
            Ok(result) => result,
            Err(_) => {
                self.on_timeout.on_timeout(invocation);
                debug!(
                    session_id = %invocation.session_id,
                    phase = %invocation.phase,
                    "Timeout handler returned, reporting the run as failed"
                );
                Err(ToolError::Timeout {
                    phase: invocation.phase,
                    deadline: invocation.deadline,
                })
            }
        }
    }
}
