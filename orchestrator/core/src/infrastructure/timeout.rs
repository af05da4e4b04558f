// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Timeout handlers for provisioning tool deadlines.

use parking_lot::Mutex;
use std::io::Write;

use crate::domain::provisioner::{TimeoutHandler, ToolInvocation, ToolPhase};
use crate::domain::session::SessionId;

/// Exit status used when a tool run outlives its deadline
pub const TIMEOUT_EXIT_CODE: i32 = 9;

/// Terminates the whole process. Nothing is rolled back; an external
/// supervisor restarts the service and operators reconcile.
#[derive(Debug, Clone, Copy)]
pub struct ExitProcessOnTimeout {
    exit_code: i32,
}

impl ExitProcessOnTimeout {
    pub fn new() -> Self {
        Self {
            exit_code: TIMEOUT_EXIT_CODE,
        }
    }
}

impl Default for ExitProcessOnTimeout {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeoutHandler for ExitProcessOnTimeout {
    fn on_timeout(&self, invocation: &ToolInvocation) {
        tracing::error!(
            session_id = %invocation.session_id,
            phase = %invocation.phase,
            deadline = ?invocation.deadline,
            "Provisioning tool deadline exceeded, terminating process"
        );
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "Timeout ({:?}) exceeded", invocation.deadline);
        let _ = stderr.flush();
        std::process::exit(self.exit_code);
    }
}

/// Non-fatal handler that remembers which runs timed out
#[derive(Debug, Default)]
pub struct RecordingTimeoutHandler {
    fired: Mutex<Vec<(SessionId, ToolPhase)>>,
}

impl RecordingTimeoutHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fired(&self) -> Vec<(SessionId, ToolPhase)> {
        self.fired.lock().clone()
    }
}

impl TimeoutHandler for RecordingTimeoutHandler {
    fn on_timeout(&self, invocation: &ToolInvocation) {
        tracing::warn!(
            session_id = %invocation.session_id,
            phase = %invocation.phase,
            "Provisioning tool deadline exceeded"
        );
        self.fired
            .lock()
            .push((invocation.session_id.clone(), invocation.phase));
    }
}
