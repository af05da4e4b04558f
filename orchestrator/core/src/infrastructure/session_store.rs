// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Sled-backed session store
//!
//! All records live in a single tree of one embedded database. The engine's
//! own transactions provide the check-then-write atomicity of `insert`; the
//! `RwLock` around the handle only detects the closed state. Normal calls
//! hold the read side, `close` takes the write side.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::repository::{SessionStore, StoreError};
use crate::domain::session::{SessionId, SessionRecord};

const SESSIONS_TREE: &str = "savedstates";

pub struct SledSessionStore {
    db: RwLock<Option<sled::Db>>,
    path: PathBuf,
    ttl: chrono::Duration,
}

impl SledSessionStore {
    /// Open (or create) the database directory at `path`.
    ///
    /// `mode` is applied to the directory on Unix platforms.
    pub fn open(path: impl AsRef<Path>, ttl: Duration, mode: u32) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)
            .map_err(|e| StoreError::Storage(format!("failed to create {:?}: {}", path, e)))?;
        restrict_permissions(&path, mode)?;

        let db = sled::Config::new().path(&path).open()?;
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StoreError::Storage(format!("invalid ttl: {}", e)))?;

        info!(path = ?path, ttl_secs = ttl.num_seconds(), "Session store opened");

        Ok(Self {
            db: RwLock::new(Some(db)),
            path,
            ttl,
        })
    }

    /// Tree holding the records, `None` until the first insert created it
    fn existing_tree(db: &sled::Db) -> Result<Option<sled::Tree>, StoreError> {
        let exists = db
            .tree_names()
            .iter()
            .any(|name| &**name == SESSIONS_TREE.as_bytes());
        if !exists {
            return Ok(None);
        }
        Ok(Some(db.open_tree(SESSIONS_TREE)?))
    }

    fn decode(bytes: &[u8]) -> Result<SessionRecord, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn encode(record: &SessionRecord) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(record).map_err(|e| StoreError::Storage(e.to_string()))
    }

    fn is_removable(bytes: &[u8], now: DateTime<Utc>) -> bool {
        match Self::decode(bytes) {
            Ok(record) => record.is_expired_at(now),
            Err(_) => true,
        }
    }
}

impl SledSessionStore {
    /// Keys whose records are expired or unreadable at `now`
    fn scan_removable(tree: &sled::Tree, now: DateTime<Utc>) -> Result<Vec<sled::IVec>, StoreError> {
        let mut candidates = Vec::new();
        for entry in tree.iter() {
            let (key, value) = entry?;
            if Self::is_removable(&value, now) {
                candidates.push(key);
            }
        }
        Ok(candidates)
    }

    /// Delete `key` if its record is still removable inside the transaction.
    /// A record reclaimed or saved after the scan is left alone.
    fn remove_if_removable(
        tree: &sled::Tree,
        key: &[u8],
        now: DateTime<Utc>,
    ) -> Result<bool, TransactionError<StoreError>> {
        tree.transaction(|tx| -> ConflictableTransactionResult<bool, StoreError> {
            match tx.get(key)? {
                Some(value) if Self::is_removable(&value, now) => {
                    tx.remove(key)?;
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(|e| StoreError::Storage(format!("failed to chmod {:?}: {}", path, e)))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> Result<(), StoreError> {
    Ok(())
}

fn flatten(err: TransactionError<StoreError>) -> StoreError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => e.into(),
    }
}

#[async_trait]
impl SessionStore for SledSessionStore {
    async fn insert(&self, id: &SessionId) -> Result<(), StoreError> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(StoreError::ConnectClosed)?;
        let tree = db.open_tree(SESSIONS_TREE)?;

        let now = Utc::now();
        let value = Self::encode(&SessionRecord::new(now, self.ttl))?;

        tree.transaction(|tx| -> ConflictableTransactionResult<(), StoreError> {
            if let Some(existing) = tx.get(id.as_bytes())? {
                // Unreadable records are reclaimed like expired ones
                if let Ok(record) = Self::decode(&existing) {
                    if !record.is_expired_at(now) {
                        return Err(ConflictableTransactionError::Abort(
                            StoreError::AlreadyExists(id.to_string()),
                        ));
                    }
                }
            }
            tx.insert(id.as_bytes(), value.clone())?;
            Ok(())
        })
        .map_err(flatten)?;

        debug!(session_id = %id, "Session record inserted");
        Ok(())
    }

    async fn save(&self, id: &SessionId, record: &mut SessionRecord) -> Result<(), StoreError> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(StoreError::ConnectClosed)?;
        let tree = Self::existing_tree(db)?
            .ok_or_else(|| StoreError::NoSuchBucket(SESSIONS_TREE.to_string()))?;

        record.touch(Utc::now(), self.ttl);
        let value = Self::encode(record)?;

        tree.transaction(|tx| -> ConflictableTransactionResult<(), StoreError> {
            tx.insert(id.as_bytes(), value.clone())?;
            Ok(())
        })
        .map_err(flatten)?;

        debug!(session_id = %id, expires_at = %record.expires_at, "Session record saved");
        Ok(())
    }

    async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(StoreError::ConnectClosed)?;
        let Some(tree) = Self::existing_tree(db)? else {
            return Ok(None);
        };

        let Some(bytes) = tree.get(id.as_bytes())? else {
            return Ok(None);
        };

        let record = Self::decode(&bytes)?;
        if record.is_expired_at(Utc::now()) {
            return Ok(None);
        }
        Ok(Some(record))
    }

    async fn cleanup(&self) -> Result<Vec<SessionId>, StoreError> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(StoreError::ConnectClosed)?;
        let Some(tree) = Self::existing_tree(db)? else {
            return Ok(Vec::new());
        };

        let candidates = Self::scan_removable(&tree, Utc::now())?;

        let mut removed = Vec::with_capacity(candidates.len());
        for key in candidates {
            let id = SessionId::new(String::from_utf8_lossy(&key).into_owned());
            match Self::remove_if_removable(&tree, &key, Utc::now()) {
                Ok(true) => removed.push(id),
                Ok(false) => debug!(session_id = %id, "Session refreshed since scan, kept"),
                Err(e) => warn!(session_id = %id, error = %flatten(e), "Failed to remove expired session"),
            }
        }

        Ok(removed)
    }

    async fn close(&self) -> Result<(), StoreError> {
        let mut guard = self.db.write();
        let Some(db) = guard.take() else {
            return Err(StoreError::ConnectClosed);
        };
        db.flush()?;
        info!(path = ?self.path, "Session store closed");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sled:{}", self.path.display())
    }
}
