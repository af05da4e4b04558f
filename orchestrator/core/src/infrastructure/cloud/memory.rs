// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory cloud providers
//!
//! A single process-local "account" holding hosted zones and versioned
//! buckets. Listing, pagination and bulk-delete limits behave like the real
//! services so teardown can be exercised end to end.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::IpAddr;
use std::sync::Arc;

use crate::domain::cloud::{
    CloudConnector, CloudCredentials, CloudError, DnsZoneProvider, HostResolver,
    ObjectIdentifier, ObjectListing, ObjectStorageProvider, VersionListing, MAX_DELETE_BATCH,
};

#[derive(Debug, Default)]
struct Bucket {
    current: BTreeSet<String>,
    /// (key, version id) -> is delete marker
    versions: BTreeMap<(String, String), bool>,
}

#[derive(Debug, Default)]
struct CloudState {
    zones: BTreeMap<String, String>,
    buckets: HashMap<String, Bucket>,
    next_id: u64,
    delete_batches: Vec<usize>,
}

impl CloudState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}{:08}", prefix, self.next_id)
    }

    fn bucket_mut(&mut self, name: &str) -> Result<&mut Bucket, CloudError> {
        self.buckets
            .get_mut(name)
            .ok_or_else(|| CloudError::BucketNotFound(name.to_string()))
    }
}

/// Shared in-memory account implementing every cloud boundary
#[derive(Clone, Default)]
pub struct InMemoryCloud {
    state: Arc<Mutex<CloudState>>,
}

impl InMemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a hosted zone and return its id
    pub fn create_zone(&self, name: &str) -> String {
        let mut state = self.state.lock();
        let id = state.next_id("/hostedzone/Z");
        state.zones.insert(name.to_string(), id.clone());
        id
    }

    pub fn zone_exists(&self, name: &str) -> bool {
        self.state.lock().zones.contains_key(name)
    }

    pub fn create_bucket(&self, name: &str) {
        self.state
            .lock()
            .buckets
            .entry(name.to_string())
            .or_default();
    }

    pub fn bucket_exists(&self, name: &str) -> bool {
        self.state.lock().buckets.contains_key(name)
    }

    /// Store a new version of `key` and make it current
    pub fn put_object(&self, bucket: &str, key: &str) -> Result<(), CloudError> {
        let mut state = self.state.lock();
        let version = state.next_id("v");
        let b = state.bucket_mut(bucket)?;
        b.current.insert(key.to_string());
        b.versions.insert((key.to_string(), version), false);
        Ok(())
    }

    /// Number of current objects plus stored versions and delete markers
    pub fn bucket_entry_count(&self, bucket: &str) -> usize {
        self.state
            .lock()
            .buckets
            .get(bucket)
            .map(|b| b.current.len() + b.versions.len())
            .unwrap_or(0)
    }

    /// Sizes of every bulk delete call made so far
    pub fn delete_batches(&self) -> Vec<usize> {
        self.state.lock().delete_batches.clone()
    }
}

#[async_trait]
impl DnsZoneProvider for InMemoryCloud {
    async fn find_zone(&self, name: &str) -> Result<Option<String>, CloudError> {
        Ok(self.state.lock().zones.get(name).cloned())
    }

    async fn delete_zone(&self, zone_id: &str) -> Result<String, CloudError> {
        let mut state = self.state.lock();
        let name = state
            .zones
            .iter()
            .find(|(_, id)| id.as_str() == zone_id)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| CloudError::ZoneNotFound(zone_id.to_string()))?;
        state.zones.remove(&name);
        Ok("PENDING".to_string())
    }
}

#[async_trait]
impl ObjectStorageProvider for InMemoryCloud {
    async fn list_objects(
        &self,
        bucket: &str,
        marker: Option<&str>,
        max_keys: usize,
    ) -> Result<ObjectListing, CloudError> {
        let mut state = self.state.lock();
        let b = state.bucket_mut(bucket)?;

        let mut remaining = b
            .current
            .iter()
            .filter(|key| marker.is_none_or(|m| key.as_str() > m));
        let keys: Vec<String> = remaining.by_ref().take(max_keys).cloned().collect();
        let is_truncated = remaining.next().is_some();

        Ok(ObjectListing { keys, is_truncated })
    }

    async fn list_object_versions(
        &self,
        bucket: &str,
        key_marker: Option<&str>,
        version_id_marker: Option<&str>,
        max_keys: usize,
    ) -> Result<VersionListing, CloudError> {
        let mut state = self.state.lock();
        let b = state.bucket_mut(bucket)?;

        let after_marker = |key: &str, version: &str| match (key_marker, version_id_marker) {
            (None, _) => true,
            (Some(km), None) => key > km,
            (Some(km), Some(vm)) => key > km || (key == km && version > vm),
        };

        let mut remaining = b
            .versions
            .iter()
            .filter(|((key, version), _)| after_marker(key, version));
        let page: Vec<_> = remaining.by_ref().take(max_keys).collect();
        let is_truncated = remaining.next().is_some();

        let mut listing = VersionListing {
            is_truncated,
            ..Default::default()
        };
        for ((key, version), is_marker) in &page {
            let id = ObjectIdentifier::version(key.clone(), version.clone());
            if **is_marker {
                listing.delete_markers.push(id);
            } else {
                listing.versions.push(id);
            }
        }
        if is_truncated {
            if let Some(((key, version), _)) = page.last() {
                listing.next_key_marker = Some(key.clone());
                listing.next_version_id_marker = Some(version.clone());
            }
        }

        Ok(listing)
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        objects: &[ObjectIdentifier],
    ) -> Result<(), CloudError> {
        if objects.len() > MAX_DELETE_BATCH {
            return Err(CloudError::BatchTooLarge {
                requested: objects.len(),
                limit: MAX_DELETE_BATCH,
            });
        }

        let mut state = self.state.lock();
        state.delete_batches.push(objects.len());
        let mut markers = Vec::new();
        {
            let b = state.bucket_mut(bucket)?;
            for object in objects {
                match &object.version_id {
                    Some(version) => {
                        b.versions.remove(&(object.key.clone(), version.clone()));
                        let still_current = b
                            .versions
                            .iter()
                            .any(|((key, _), is_marker)| key == &object.key && !is_marker);
                        if !still_current {
                            b.current.remove(&object.key);
                        }
                    }
                    None => {
                        if b.current.remove(&object.key) {
                            markers.push(object.key.clone());
                        }
                    }
                }
            }
        }

        // Unversioned deletes leave a delete marker behind, like a versioned bucket
        for key in markers {
            let version = state.next_id("m");
            state.bucket_mut(bucket)?.versions.insert((key, version), true);
        }
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), CloudError> {
        let mut state = self.state.lock();
        let b = state.bucket_mut(bucket)?;
        if !b.current.is_empty() || !b.versions.is_empty() {
            return Err(CloudError::BucketNotEmpty(bucket.to_string()));
        }
        state.buckets.remove(bucket);
        Ok(())
    }
}

impl CloudConnector for InMemoryCloud {
    fn dns(&self, _credentials: &CloudCredentials) -> Result<Arc<dyn DnsZoneProvider>, CloudError> {
        Ok(Arc::new(self.clone()))
    }

    fn storage(
        &self,
        _credentials: &CloudCredentials,
    ) -> Result<Arc<dyn ObjectStorageProvider>, CloudError> {
        Ok(Arc::new(self.clone()))
    }
}

/// Resolver answering from a fixed host table
#[derive(Default)]
pub struct StaticHostResolver {
    hosts: Mutex<HashMap<String, Vec<IpAddr>>>,
}

impl StaticHostResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, host: &str, addr: IpAddr) {
        self.hosts.lock().entry(host.to_string()).or_default().push(addr);
    }
}

#[async_trait]
impl HostResolver for StaticHostResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, CloudError> {
        self.hosts
            .lock()
            .get(host)
            .cloned()
            .ok_or_else(|| CloudError::Unresolved(host.to_string()))
    }
}
