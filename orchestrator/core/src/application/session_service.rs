// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Session Application Service
//!
//! Request-path steps of the installer wizard. Every step loads the whole
//! record, changes its own fields and writes the whole record back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::application::phase_tracker::PhaseTracker;
use crate::domain::repository::{SessionStore, StoreError};
use crate::domain::session::{NodeGroupSpec, SessionId, SessionRecord};

/// Smallest accepted volume size, in GB
pub const MIN_VOLUME_SIZE: i64 = 20;

// Instance families the provisioning tool knows how to size
const SUPPORTED_TYPE_PREFIXES: &[&str] = &[
    "t2.", "m3.", "m4.", "c3.", "c4.", "cc2.", "cg1.", "cr1.", "d2.", "g2.", "hi1.", "i2.",
    "i3.", "r3.", "x1.", "r4.", "p2.",
];

const PROHIBITED_TYPES: &[&str] = &["t2.nano", "t2.micro", "t2.small"];

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found or expired: {0}")]
    NotFound(SessionId),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Cluster settings are locked while a run is in progress for session {0}")]
    RunInProgress(SessionId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsInput {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub ssh_public_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterInput {
    pub domain: String,
    pub name: String,
    #[serde(default)]
    pub cluster_type: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsZoneInput {
    pub zone_id: String,
    #[serde(default)]
    pub zone_change_id: String,
    #[serde(default)]
    pub record_change_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodesInput {
    pub master: NodeGroupSpec,
    pub nodes: NodeGroupSpec,
}

#[async_trait]
pub trait SessionService: Send + Sync {
    /// Start a new session, returning its token
    async fn open_session(&self) -> Result<SessionId, SessionError>;

    async fn get_session(&self, id: &SessionId) -> Result<SessionRecord, SessionError>;

    async fn set_credentials(&self, id: &SessionId, input: CredentialsInput) -> Result<(), SessionError>;

    /// Record the cluster identity. Restarts the provisioning lifecycle.
    /// Rejected while a provisioning or teardown run is in flight.
    async fn set_cluster(&self, id: &SessionId, input: ClusterInput) -> Result<(), SessionError>;

    async fn set_dns_zone(&self, id: &SessionId, input: DnsZoneInput) -> Result<(), SessionError>;

    /// Rejected while a provisioning or teardown run is in flight
    async fn set_nodes(&self, id: &SessionId, input: NodesInput) -> Result<(), SessionError>;

    async fn set_products(&self, id: &SessionId, products: Vec<String>) -> Result<(), SessionError>;

    /// Cluster access config captured after a successful create phase
    async fn kubeconfig(&self, id: &SessionId) -> Result<Vec<u8>, SessionError>;
}

pub struct StandardSessionService {
    store: Arc<dyn SessionStore>,
    tracker: Arc<PhaseTracker>,
}

impl StandardSessionService {
    pub fn new(store: Arc<dyn SessionStore>, tracker: Arc<PhaseTracker>) -> Self {
        Self { store, tracker }
    }

    async fn load(&self, id: &SessionId) -> Result<SessionRecord, SessionError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| SessionError::NotFound(id.clone()))
    }

    fn ensure_idle(&self, id: &SessionId) -> Result<(), SessionError> {
        if self.tracker.is_running(id) {
            return Err(SessionError::RunInProgress(id.clone()));
        }
        Ok(())
    }

    async fn update<F>(&self, id: &SessionId, apply: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut SessionRecord) + Send,
    {
        let mut record = self.load(id).await?;
        apply(&mut record);
        self.store.save(id, &mut record).await?;
        Ok(())
    }
}

/// The key must at least carry a type and a base64 body
pub fn validate_ssh_public_key(key: &str) -> Result<(), SessionError> {
    if key.split_whitespace().count() < 2 {
        return Err(SessionError::InvalidInput(
            "SSH public key is not valid".to_string(),
        ));
    }
    Ok(())
}

pub fn is_supported_machine_type(machine_type: &str) -> bool {
    !PROHIBITED_TYPES.contains(&machine_type)
        && SUPPORTED_TYPE_PREFIXES
            .iter()
            .any(|prefix| machine_type.len() > prefix.len() && machine_type.starts_with(prefix))
}

fn validate_nodes(input: &NodesInput) -> Result<(), SessionError> {
    for group in [&input.master, &input.nodes] {
        if !is_supported_machine_type(&group.machine_type) {
            return Err(SessionError::InvalidInput(format!(
                "Instance type not handled: {:?}",
                group.machine_type
            )));
        }
    }

    if input.master.storage_size < MIN_VOLUME_SIZE || input.nodes.storage_size < MIN_VOLUME_SIZE {
        return Err(SessionError::InvalidInput(format!(
            "Minimum volume size is {}",
            MIN_VOLUME_SIZE
        )));
    }

    if input.master.zone_count_mismatch() {
        return Err(SessionError::InvalidInput(format!(
            "specified {} master zones, but also requested {} masters. If specifying both, the count should match",
            input.master.zones.len(),
            input.master.quantity
        )));
    }

    Ok(())
}

fn normalize_domain(domain: &str) -> String {
    let domain = domain.trim().to_lowercase();
    if domain.ends_with('.') {
        domain
    } else {
        format!("{}.", domain)
    }
}

#[async_trait]
impl SessionService for StandardSessionService {
    async fn open_session(&self) -> Result<SessionId, SessionError> {
        let id = SessionId::generate();
        self.store.insert(&id).await?;
        info!(session_id = %id, "Session opened");
        Ok(id)
    }

    async fn get_session(&self, id: &SessionId) -> Result<SessionRecord, SessionError> {
        self.load(id).await
    }

    async fn set_credentials(&self, id: &SessionId, input: CredentialsInput) -> Result<(), SessionError> {
        validate_ssh_public_key(&input.ssh_public_key)?;

        self.update(id, |record| {
            record.access_key = input.access_key;
            record.secret_key = input.secret_key;
            record.region = input.region;
            record.ssh_public_key = input.ssh_public_key;
        })
        .await?;

        debug!(session_id = %id, "Credentials saved");
        Ok(())
    }

    async fn set_cluster(&self, id: &SessionId, input: ClusterInput) -> Result<(), SessionError> {
        if input.name.trim().is_empty() || input.domain.trim().trim_end_matches('.').is_empty() {
            return Err(SessionError::InvalidInput(
                "Cluster name and domain are required".to_string(),
            ));
        }
        self.ensure_idle(id)?;

        let bucket = id.storage_container_name();
        self.update(id, |record| {
            record.name = input.name.trim().to_lowercase();
            record.domain = normalize_domain(&input.domain);
            record.cluster_type = input.cluster_type;
            record.bucket = bucket;
        })
        .await?;

        self.tracker.clear(id);
        debug!(session_id = %id, "Cluster parameters saved");
        Ok(())
    }

    async fn set_dns_zone(&self, id: &SessionId, input: DnsZoneInput) -> Result<(), SessionError> {
        self.update(id, |record| {
            record.zone_id = input.zone_id;
            record.zone_change_id = input.zone_change_id;
            record.record_change_id = input.record_change_id;
        })
        .await
    }

    async fn set_nodes(&self, id: &SessionId, input: NodesInput) -> Result<(), SessionError> {
        validate_nodes(&input)?;
        self.ensure_idle(id)?;

        self.update(id, |record| {
            record.master = input.master;
            record.nodes = input.nodes;
        })
        .await?;

        debug!(session_id = %id, "Node groups saved");
        Ok(())
    }

    async fn set_products(&self, id: &SessionId, products: Vec<String>) -> Result<(), SessionError> {
        self.update(id, |record| record.products = products).await
    }

    async fn kubeconfig(&self, id: &SessionId) -> Result<Vec<u8>, SessionError> {
        Ok(self.load(id).await?.kubeconfig)
    }
}
