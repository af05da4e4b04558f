// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Session Store Interface
//!
//! Persistence contract for `SessionRecord`s: a key-value store with
//! time-based expiry. The interface lives in the domain layer and is
//! implemented in `crate::infrastructure::session_store`.
//!
//! | Operation | Semantics |
//! |-----------|-----------|
//! | `insert`  | create once per active id, reclaim expired ids |
//! | `save`    | full overwrite, refreshes timestamps |
//! | `get`     | `None` when absent or logically expired |
//! | `cleanup` | sweep expired or unreadable records |
//! | `close`   | every later call fails with `ConnectClosed` |

use async_trait::async_trait;
use crate::domain::session::{SessionId, SessionRecord};

/// Expiring key-value store of session records
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a fresh record for `id`.
    /// Fails with `AlreadyExists` while an unexpired record is stored.
    async fn insert(&self, id: &SessionId) -> Result<(), StoreError>;

    /// Overwrite the record for `id`.
    /// `modified_at` and `expires_at` on `record` are refreshed before writing.
    async fn save(&self, id: &SessionId, record: &mut SessionRecord) -> Result<(), StoreError>;

    /// Load the record for `id`, `None` if absent or expired
    async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError>;

    /// Remove expired and corrupt records, returning the removed ids
    async fn cleanup(&self) -> Result<Vec<SessionId>, StoreError>;

    /// Release the underlying engine
    async fn close(&self) -> Result<(), StoreError>;

    /// Human readable description of the backing storage
    fn describe(&self) -> String;
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Key already exists: {0}")]
    AlreadyExists(String),

    #[error("Connect closed")]
    ConnectClosed,

    #[error("Bucket does not exist: {0:?}")]
    NoSuchBucket(String),

    #[error("Record damaged: {0}")]
    Corrupt(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}
