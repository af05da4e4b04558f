// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Teardown Orchestrator
//!
//! Removes everything provisioning created for a session: the cluster (via
//! the tool's delete phase), the hosted zone and the state bucket including
//! every object version. Steps run in order and the first failure stops the
//! run. Failures are logged and published on the event bus, never persisted.
//!
//! The phase tracker entry is cleared as soon as teardown is accepted, so a
//! status query during teardown reads `Initial`.

use anyhow::{bail, Context};
use chrono::Utc;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::application::background::BackgroundTasks;
use crate::application::phase_tracker::PhaseTracker;
use crate::application::provisioning::{load_complete_record, log_tool_failure, ProvisioningError};
use crate::application::watchdog::DeadlineGuard;
use crate::domain::cloud::{
    CloudConnector, CloudCredentials, ObjectIdentifier, ObjectStorageProvider, MAX_DELETE_BATCH,
};
use crate::domain::events::ProvisioningEvent;
use crate::domain::provisioner::{ToolInvocation, ToolPhase};
use crate::domain::repository::SessionStore;
use crate::domain::session::{SessionId, SessionRecord};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::workspace::SessionWorkspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TeardownStep {
    DeleteCluster,
    DeleteZone,
    EmptyBucket,
    DeleteBucket,
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TeardownStep::DeleteCluster => "delete-cluster",
            TeardownStep::DeleteZone => "delete-zone",
            TeardownStep::EmptyBucket => "empty-bucket",
            TeardownStep::DeleteBucket => "delete-bucket",
        };
        f.write_str(name)
    }
}

#[derive(Clone)]
pub struct TeardownOrchestrator {
    store: Arc<dyn SessionStore>,
    tracker: Arc<PhaseTracker>,
    guard: DeadlineGuard,
    cloud: Arc<dyn CloudConnector>,
    workspace: SessionWorkspace,
    tasks: BackgroundTasks,
    event_bus: EventBus,
    phase_timeout: Duration,
}

impl TeardownOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn SessionStore>,
        tracker: Arc<PhaseTracker>,
        guard: DeadlineGuard,
        cloud: Arc<dyn CloudConnector>,
        workspace: SessionWorkspace,
        tasks: BackgroundTasks,
        event_bus: EventBus,
        phase_timeout: Duration,
    ) -> Self {
        Self {
            store,
            tracker,
            guard,
            cloud,
            workspace,
            tasks,
            event_bus,
            phase_timeout,
        }
    }

    /// Validate the session and dispatch the teardown steps
    pub async fn start(&self, id: &SessionId) -> Result<(), ProvisioningError> {
        let run = self
            .tracker
            .begin_run(id)
            .ok_or_else(|| ProvisioningError::RunInProgress(id.clone()))?;

        let record = load_complete_record(self.store.as_ref(), id).await?;
        let home = self.workspace.prepare(id, &record.ssh_public_key).await?;

        self.tracker.clear(id);
        info!(session_id = %id, cluster = %record.cluster_name(), "Teardown dispatched");

        let this = self.clone();
        let session_id = id.clone();
        self.tasks.spawn("teardown", id.clone(), async move {
            let _run = run;
            this.run(session_id, record, home).await;
        });
        Ok(())
    }

    async fn run(&self, id: SessionId, record: SessionRecord, home: PathBuf) {
        match self.run_steps(&id, &record, &home).await {
            Ok(()) => {
                info!(session_id = %id, "Teardown complete");
                self.event_bus
                    .publish_provisioning_event(ProvisioningEvent::TeardownFinished {
                        session_id: id,
                        finished_at: Utc::now(),
                    });
            }
            Err((step, e)) => {
                error!(session_id = %id, %step, "Teardown stopped: {:#}", e);
                self.event_bus
                    .publish_provisioning_event(ProvisioningEvent::TeardownFailed {
                        session_id: id,
                        step: step.to_string(),
                        reason: format!("{:#}", e),
                        failed_at: Utc::now(),
                    });
            }
        }
    }

    async fn run_steps(
        &self,
        id: &SessionId,
        record: &SessionRecord,
        home: &Path,
    ) -> Result<(), (TeardownStep, anyhow::Error)> {
        self.delete_cluster(id, record, home)
            .await
            .map_err(|e| (TeardownStep::DeleteCluster, e))?;

        let credentials = CloudCredentials {
            access_key: record.access_key.clone(),
            secret_key: record.secret_key.clone(),
            region: record.region.clone(),
        };

        self.delete_zone(id, &record.zone_name(), &credentials)
            .await
            .map_err(|e| (TeardownStep::DeleteZone, e))?;

        let storage = self
            .cloud
            .storage(&credentials)
            .context("Failed to connect to object storage")
            .map_err(|e| (TeardownStep::EmptyBucket, e))?;

        empty_bucket(storage.as_ref(), &record.bucket)
            .await
            .map_err(|e| (TeardownStep::EmptyBucket, e))?;

        storage
            .delete_bucket(&record.bucket)
            .await
            .with_context(|| format!("Failed to delete bucket {}", record.bucket))
            .map_err(|e| (TeardownStep::DeleteBucket, e))?;
        info!(session_id = %id, bucket = %record.bucket, "Bucket deleted");

        Ok(())
    }

    async fn delete_cluster(&self, id: &SessionId, record: &SessionRecord, home: &Path) -> anyhow::Result<()> {
        let invocation = ToolInvocation::for_phase(ToolPhase::Delete, id, record, home, self.phase_timeout);
        match self.guard.run(&invocation).await {
            Ok(output) => {
                debug!(session_id = %id, output = %output.output, "Cluster deleted");
                Ok(())
            }
            Err(e) => {
                log_tool_failure(id, &e);
                Err(anyhow::Error::new(e).context("delete phase failed"))
            }
        }
    }

    async fn delete_zone(
        &self,
        id: &SessionId,
        zone_name: &str,
        credentials: &CloudCredentials,
    ) -> anyhow::Result<()> {
        let dns = self
            .cloud
            .dns(credentials)
            .context("Failed to connect to DNS")?;

        let Some(zone_id) = dns
            .find_zone(zone_name)
            .await
            .with_context(|| format!("Failed to look up zone {}", zone_name))?
        else {
            bail!("Zone does not exist: {:?}", zone_name);
        };

        let status = dns
            .delete_zone(&zone_id)
            .await
            .with_context(|| format!("Failed to delete zone {}", zone_id))?;
        info!(session_id = %id, zone = %zone_name, zone_id = %zone_id, %status, "Zone deleted");
        Ok(())
    }
}

/// Delete every current object, then every version and delete marker
pub(crate) async fn empty_bucket(storage: &dyn ObjectStorageProvider, bucket: &str) -> anyhow::Result<()> {
    let mut deleted = 0usize;

    let mut marker: Option<String> = None;
    loop {
        let page = storage
            .list_objects(bucket, marker.as_deref(), MAX_DELETE_BATCH)
            .await
            .with_context(|| format!("Failed to list objects of {}", bucket))?;

        let batch: Vec<ObjectIdentifier> = page.keys.iter().map(|key| ObjectIdentifier::key(key.as_str())).collect();
        delete_in_batches(storage, bucket, &batch).await?;
        deleted += batch.len();

        if !page.is_truncated {
            break;
        }
        marker = page.keys.last().cloned();
        if marker.is_none() {
            bail!("Truncated object listing of {} carried no keys", bucket);
        }
    }

    let mut key_marker: Option<String> = None;
    let mut version_marker: Option<String> = None;
    loop {
        let page = storage
            .list_object_versions(
                bucket,
                key_marker.as_deref(),
                version_marker.as_deref(),
                MAX_DELETE_BATCH,
            )
            .await
            .with_context(|| format!("Failed to list object versions of {}", bucket))?;

        let batch: Vec<ObjectIdentifier> = page
            .versions
            .into_iter()
            .chain(page.delete_markers)
            .collect();
        delete_in_batches(storage, bucket, &batch).await?;
        deleted += batch.len();

        if !page.is_truncated {
            break;
        }
        if page.next_key_marker.is_none() {
            bail!("Truncated version listing of {} carried no continuation marker", bucket);
        }
        key_marker = page.next_key_marker;
        version_marker = page.next_version_id_marker;
    }

    debug!(bucket = %bucket, deleted, "Bucket emptied");
    Ok(())
}

async fn delete_in_batches(
    storage: &dyn ObjectStorageProvider,
    bucket: &str,
    objects: &[ObjectIdentifier],
) -> anyhow::Result<()> {
    for chunk in objects.chunks(MAX_DELETE_BATCH) {
        storage
            .delete_objects(bucket, chunk)
            .await
            .with_context(|| format!("Failed to delete {} objects from {}", chunk.len(), bucket))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::cloud::memory::InMemoryCloud;

    #[tokio::test]
    async fn test_empty_bucket_pages_through_objects_and_versions() {
        let cloud = InMemoryCloud::new();
        cloud.create_bucket("b");
        for i in 0..2500 {
            cloud.put_object("b", &format!("k{:05}", i)).unwrap();
        }

        empty_bucket(&cloud, "b").await.unwrap();

        assert_eq!(cloud.bucket_entry_count("b"), 0);
        let batches = cloud.delete_batches();
        assert!(batches.len() >= 3);
        assert!(batches.iter().all(|n| *n <= MAX_DELETE_BATCH));
        cloud.delete_bucket("b").await.unwrap();
        assert!(!cloud.bucket_exists("b"));
    }

    #[tokio::test]
    async fn test_empty_bucket_on_empty_bucket() {
        let cloud = InMemoryCloud::new();
        cloud.create_bucket("b");

        empty_bucket(&cloud, "b").await.unwrap();
        assert!(cloud.delete_batches().is_empty());
    }

    #[tokio::test]
    async fn test_missing_bucket_fails() {
        let cloud = InMemoryCloud::new();
        assert!(empty_bucket(&cloud, "nope").await.is_err());
    }
}
