// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Cloud provider boundaries
//!
//! DNS hosted zones, object storage and host resolution are remote services
//! owned by the cloud account of the session. The installer only needs the
//! narrow slice of each API defined here; concrete bindings live in
//! `crate::infrastructure::cloud`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;

/// Maximum number of keys accepted by one bulk delete call
pub const MAX_DELETE_BATCH: usize = 1000;

/// Credentials acting on behalf of the session owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudCredentials {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("Zone does not exist: {0:?}")]
    ZoneNotFound(String),
    #[error("Bucket does not exist: {0:?}")]
    BucketNotFound(String),
    #[error("Bucket not empty: {0:?}")]
    BucketNotEmpty(String),
    #[error("Bulk delete of {requested} keys exceeds the limit of {limit}")]
    BatchTooLarge { requested: usize, limit: usize },
    #[error("Host {0:?} does not resolve")]
    Unresolved(String),
    #[error("Cloud provider error: {0}")]
    Provider(String),
}

/// Identifier of one object, or one version of it, in a bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectIdentifier {
    pub key: String,
    pub version_id: Option<String>,
}

impl ObjectIdentifier {
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version_id: None,
        }
    }

    pub fn version(key: impl Into<String>, version_id: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version_id: Some(version_id.into()),
        }
    }
}

/// One page of a current-object listing, in key order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectListing {
    pub keys: Vec<String>,
    pub is_truncated: bool,
}

/// One page of a version listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionListing {
    pub versions: Vec<ObjectIdentifier>,
    pub delete_markers: Vec<ObjectIdentifier>,
    pub is_truncated: bool,
    pub next_key_marker: Option<String>,
    pub next_version_id_marker: Option<String>,
}

/// Hosted DNS zones
#[async_trait]
pub trait DnsZoneProvider: Send + Sync {
    /// Id of the zone named exactly `name` (rooted, with trailing dot)
    async fn find_zone(&self, name: &str) -> Result<Option<String>, CloudError>;

    /// Delete a zone, returning the provider change status
    async fn delete_zone(&self, zone_id: &str) -> Result<String, CloudError>;
}

/// Object storage buckets
#[async_trait]
pub trait ObjectStorageProvider: Send + Sync {
    /// List current objects with keys strictly after `marker`
    async fn list_objects(
        &self,
        bucket: &str,
        marker: Option<&str>,
        max_keys: usize,
    ) -> Result<ObjectListing, CloudError>;

    /// List versions and delete markers, resuming after the given markers
    async fn list_object_versions(
        &self,
        bucket: &str,
        key_marker: Option<&str>,
        version_id_marker: Option<&str>,
        max_keys: usize,
    ) -> Result<VersionListing, CloudError>;

    /// Bulk delete of at most `MAX_DELETE_BATCH` identifiers
    async fn delete_objects(
        &self,
        bucket: &str,
        objects: &[ObjectIdentifier],
    ) -> Result<(), CloudError>;

    async fn delete_bucket(&self, bucket: &str) -> Result<(), CloudError>;
}

/// Name resolution for the cluster API endpoint
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, CloudError>;
}

/// Builds provider clients bound to one set of session credentials
pub trait CloudConnector: Send + Sync {
    fn dns(&self, credentials: &CloudCredentials) -> Result<Arc<dyn DnsZoneProvider>, CloudError>;

    fn storage(
        &self,
        credentials: &CloudCredentials,
    ) -> Result<Arc<dyn ObjectStorageProvider>, CloudError>;
}
