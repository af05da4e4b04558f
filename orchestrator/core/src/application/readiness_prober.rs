// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Readiness Prober
//!
//! Polled from outside. Only a fully matching `validate` output moves a
//! session to `Ready`; every other outcome leaves the tracker untouched.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::application::phase_tracker::PhaseTracker;
use crate::application::provisioning::{log_tool_failure, ProvisioningError};
use crate::application::watchdog::DeadlineGuard;
use crate::domain::cloud::HostResolver;
use crate::domain::phase::Phase;
use crate::domain::provisioner::{ToolInvocation, ToolPhase};
use crate::domain::readiness::is_cluster_ready;
use crate::domain::repository::SessionStore;
use crate::domain::session::SessionId;
use crate::infrastructure::workspace::SessionWorkspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadinessReport {
    pub ready: bool,
    pub phase: Phase,
}

impl ReadinessReport {
    fn from_phase(phase: Phase) -> Self {
        Self {
            ready: phase == Phase::Ready,
            phase,
        }
    }
}

pub struct ReadinessProber {
    store: Arc<dyn SessionStore>,
    tracker: Arc<PhaseTracker>,
    guard: DeadlineGuard,
    resolver: Arc<dyn HostResolver>,
    workspace: SessionWorkspace,
    phase_timeout: Duration,
}

impl ReadinessProber {
    pub fn new(
        store: Arc<dyn SessionStore>,
        tracker: Arc<PhaseTracker>,
        guard: DeadlineGuard,
        resolver: Arc<dyn HostResolver>,
        workspace: SessionWorkspace,
        phase_timeout: Duration,
    ) -> Self {
        Self {
            store,
            tracker,
            guard,
            resolver,
            workspace,
            phase_timeout,
        }
    }

    pub async fn probe(&self, id: &SessionId) -> Result<ReadinessReport, ProvisioningError> {
        let current = self.tracker.get(id);
        if current < Phase::Updated || current.is_terminal() {
            return Ok(ReadinessReport::from_phase(current));
        }

        let record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| ProvisioningError::SessionNotFound(id.clone()))?;

        let host = record.api_host();
        match self.resolver.resolve(&host).await {
            Ok(addrs) if !addrs.is_empty() => {
                debug!(session_id = %id, host = %host, addrs = ?addrs, "API endpoint resolved");
            }
            Ok(_) | Err(_) => {
                debug!(session_id = %id, host = %host, "API endpoint not resolvable yet");
                return Ok(ReadinessReport::from_phase(current));
            }
        }

        let invocation = ToolInvocation::for_phase(
            ToolPhase::Validate,
            id,
            &record,
            &self.workspace.home_dir(id),
            self.phase_timeout,
        );
        let output = match self.guard.run(&invocation).await {
            Ok(output) => output,
            Err(e) => {
                log_tool_failure(id, &e);
                return Ok(ReadinessReport::from_phase(current));
            }
        };

        if !is_cluster_ready(&output.output) {
            warn!(session_id = %id, output = %output.output, "Cluster validation did not report every member ready");
            return Ok(ReadinessReport::from_phase(current));
        }

        self.tracker.set(id, Phase::Ready);
        info!(session_id = %id, cluster = %record.cluster_name(), "Cluster ready");
        Ok(ReadinessReport::from_phase(Phase::Ready))
    }
}
