// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Session Record
//!
//! The unit of persistence of the installer: one record per installation
//! workflow, keyed by an opaque session token. Records are always written as a
//! whole (read-modify-write), never patched field by field.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224};
use std::fmt;

/// Opaque session token handed out to the client when a session is opened.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random token
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Storage container name bound to this session.
    ///
    /// Lower-case hex of SHA-224 over the raw token. Teardown relies on
    /// getting the very same name back, so the algorithm and the encoding
    /// must never change.
    pub fn storage_container_name(&self) -> String {
        hex::encode(Sha224::digest(self.0.as_bytes()))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Parameters of one group of cluster machines
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeGroupSpec {
    pub machine_type: String,
    pub quantity: i64,
    /// One availability zone per planned instance
    pub zones: Vec<String>,
    pub storage_size: i64,
    pub storage_type: String,
}

impl NodeGroupSpec {
    fn collect_missing(&self, prefix: &str, missing: &mut Vec<String>) {
        if self.quantity == 0 {
            missing.push(format!("{}.Quantity", prefix));
        }
        if self.machine_type.is_empty() {
            missing.push(format!("{}.Type", prefix));
        }
        if self.storage_size == 0 {
            missing.push(format!("{}.StorageSize", prefix));
        }
        if self.zones.is_empty() {
            missing.push(format!("{}.Zones", prefix));
        }
    }

    /// True when both count and zones are set and disagree
    pub fn zone_count_mismatch(&self) -> bool {
        match usize::try_from(self.quantity) {
            Ok(quantity) if quantity > 0 && !self.zones.is_empty() => quantity != self.zones.len(),
            _ => false,
        }
    }
}

/// Durable per-workflow state.
///
/// Unknown fields are ignored and absent ones take their defaults, so
/// records written by older or newer builds keep loading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionRecord {
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,

    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub ssh_public_key: String,

    pub domain: String,
    pub name: String,
    pub cluster_type: i64,
    pub zone_id: String,
    pub zone_change_id: String,
    pub record_change_id: String,
    pub bucket: String,

    pub master: NodeGroupSpec,
    pub nodes: NodeGroupSpec,

    pub products: Vec<String>,

    /// Cluster access config produced by the create phase
    pub kubeconfig: Vec<u8>,
}

impl SessionRecord {
    /// Fresh, mostly empty record
    pub fn new(now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            created_at: now,
            modified_at: now,
            expires_at: now + ttl,
            ..Default::default()
        }
    }

    /// Refresh the modification time and push the expiration forward
    pub fn touch(&mut self, now: DateTime<Utc>, ttl: Duration) {
        self.modified_at = now;
        self.expires_at = now + ttl;
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Fully qualified cluster name without the trailing root dot
    pub fn cluster_name(&self) -> String {
        let name = format!("{}.{}", self.name, self.domain);
        match name.strip_suffix('.') {
            Some(trimmed) => trimmed.to_string(),
            None => name,
        }
    }

    /// Hosted zone name of the cluster, always rooted
    pub fn zone_name(&self) -> String {
        format!("{}.", self.cluster_name())
    }

    /// Hostname of the cluster API endpoint
    pub fn api_host(&self) -> String {
        format!("api.{}", self.cluster_name())
    }

    /// Names of every field that must be set before the provisioning tool
    /// can be driven. Reports all of them, not just the first.
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();

        if self.name.is_empty() {
            missing.push("Name".to_string());
        }
        if self.domain.is_empty() {
            missing.push("Domain".to_string());
        }
        if self.bucket.is_empty() {
            missing.push("Bucket".to_string());
        }
        self.master.collect_missing("Master", &mut missing);
        self.nodes.collect_missing("Nodes", &mut missing);
        if self.master.zone_count_mismatch() {
            missing.push("Master.Zones (one zone per master instance)".to_string());
        }
        if self.ssh_public_key.is_empty() {
            missing.push("SSHPublicKey".to_string());
        }

        missing
    }
}
