// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Provisioning Orchestrator
//!
//! Drives the provisioning tool through create, update and rolling-update
//! for one session. The request path only checks the record and writes the
//! session home; the phases themselves run detached and report progress
//! through the [`PhaseTracker`] alone.
//!
//! Every phase is built from the record as it was when the run started.
//! Only the kubeconfig captured after create is written back.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Sequential phase execution with `Failed` short-circuit

use anyhow::{anyhow, Context};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::application::background::BackgroundTasks;
use crate::application::phase_tracker::PhaseTracker;
use crate::application::watchdog::DeadlineGuard;
use crate::domain::phase::Phase;
use crate::domain::provisioner::{ToolError, ToolInvocation, ToolOutput, ToolPhase};
use crate::domain::repository::{SessionStore, StoreError};
use crate::domain::session::{SessionId, SessionRecord};
use crate::infrastructure::workspace::SessionWorkspace;

#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("Missing required fields: {}", missing.join(", "))]
    PreconditionFailed { missing: Vec<String> },

    #[error("Session not found or expired: {0}")]
    SessionNotFound(SessionId),

    #[error("A provisioning or teardown run is already in progress for session {0}")]
    RunInProgress(SessionId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Session workspace error: {0}")]
    Io(#[from] std::io::Error),
}

/// Tool run settings shared by every phase
#[derive(Debug, Clone)]
pub struct ProvisioningSettings {
    pub phase_timeout: Duration,
    pub rolling_update: bool,
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            phase_timeout: Duration::from_secs(30 * 60),
            rolling_update: false,
        }
    }
}

/// Load a live record and check it can drive the tool
pub(crate) async fn load_complete_record(
    store: &dyn SessionStore,
    id: &SessionId,
) -> Result<SessionRecord, ProvisioningError> {
    let record = store
        .get(id)
        .await?
        .ok_or_else(|| ProvisioningError::SessionNotFound(id.clone()))?;

    let missing = record.missing_fields();
    if !missing.is_empty() {
        return Err(ProvisioningError::PreconditionFailed { missing });
    }
    Ok(record)
}

/// Tool failure with whatever output it produced, logged where it happened
pub(crate) fn log_tool_failure(id: &SessionId, err: &ToolError) {
    match err.output() {
        Some(output) => error!(session_id = %id, error = %err, output = %output, "Provisioning tool failed"),
        None => error!(session_id = %id, error = %err, "Provisioning tool failed"),
    }
}

#[derive(Clone)]
pub struct ProvisioningOrchestrator {
    store: Arc<dyn SessionStore>,
    tracker: Arc<PhaseTracker>,
    guard: DeadlineGuard,
    workspace: SessionWorkspace,
    tasks: BackgroundTasks,
    settings: ProvisioningSettings,
}

impl ProvisioningOrchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        tracker: Arc<PhaseTracker>,
        guard: DeadlineGuard,
        workspace: SessionWorkspace,
        tasks: BackgroundTasks,
        settings: ProvisioningSettings,
    ) -> Self {
        Self {
            store,
            tracker,
            guard,
            workspace,
            tasks,
            settings,
        }
    }

    /// Validate the session and dispatch the phase run.
    ///
    /// Returns once the run is scheduled; the outcome is only observable
    /// through the phase tracker, which restarts from `Initial`.
    pub async fn start(&self, id: &SessionId) -> Result<(), ProvisioningError> {
        let run = self
            .tracker
            .begin_run(id)
            .ok_or_else(|| ProvisioningError::RunInProgress(id.clone()))?;

        let mut record = load_complete_record(self.store.as_ref(), id).await?;
        let home = self.workspace.prepare(id, &record.ssh_public_key).await?;
        self.store.save(id, &mut record).await?;

        self.tracker.clear(id);
        info!(session_id = %id, cluster = %record.cluster_name(), "Provisioning dispatched");

        let this = self.clone();
        let session_id = id.clone();
        self.tasks.spawn("provision", id.clone(), async move {
            let _run = run;
            this.run(session_id, record, home).await;
        });
        Ok(())
    }

    async fn run(&self, id: SessionId, snapshot: SessionRecord, home: PathBuf) {
        if let Err(e) = self.run_phases(&id, &snapshot, &home).await {
            error!(session_id = %id, "Provisioning stopped: {:#}", e);
            self.tracker.set(&id, Phase::Failed);
        }
    }

    async fn run_phases(&self, id: &SessionId, snapshot: &SessionRecord, home: &Path) -> anyhow::Result<()> {
        self.run_tool(ToolPhase::Create, id, snapshot, home).await?;

        let kubeconfig = self
            .workspace
            .read_kubeconfig(id)
            .await
            .context("Failed to read the cluster config written by create")?;
        self.attach_kubeconfig(id, kubeconfig).await?;
        self.tracker.set(id, Phase::Created);

        self.run_tool(ToolPhase::Update, id, snapshot, home).await?;
        self.tracker.set(id, Phase::Updated);

        if self.settings.rolling_update {
            self.run_tool(ToolPhase::RollingUpdate, id, snapshot, home).await?;
        } else {
            debug!(session_id = %id, "Rolling update disabled, skipping");
        }
        self.tracker.set(id, Phase::Rolled);

        info!(session_id = %id, "Provisioning phases complete");
        Ok(())
    }

    async fn attach_kubeconfig(&self, id: &SessionId, kubeconfig: Vec<u8>) -> anyhow::Result<()> {
        let mut record = self
            .store
            .get(id)
            .await
            .context("Failed to reload session")?
            .ok_or_else(|| anyhow!("Session {} expired during provisioning", id))?;
        record.kubeconfig = kubeconfig;
        self.store
            .save(id, &mut record)
            .await
            .context("Failed to persist the cluster config")
    }

    async fn run_tool(
        &self,
        phase: ToolPhase,
        id: &SessionId,
        snapshot: &SessionRecord,
        home: &Path,
    ) -> anyhow::Result<ToolOutput> {
        let invocation =
            ToolInvocation::for_phase(phase, id, snapshot, home, self.settings.phase_timeout);

        info!(session_id = %id, %phase, "Running provisioning tool");
        match self.guard.run(&invocation).await {
            Ok(output) => {
                debug!(session_id = %id, %phase, output = %output.output, "Provisioning tool succeeded");
                Ok(output)
            }
            Err(e) => {
                log_tool_failure(id, &e);
                Err(anyhow::Error::new(e).context(format!("{} phase failed", phase)))
            }
        }
    }
}
