// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Per-session home directories of the provisioning tool.

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::domain::provisioner::SSH_KEY_FILE;
use crate::domain::session::SessionId;

/// Root directory under which every session gets `<root>/<id>`
#[derive(Debug, Clone)]
pub struct SessionWorkspace {
    root: PathBuf,
}

impl SessionWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn home_dir(&self, id: &SessionId) -> PathBuf {
        self.root.join(id.as_str())
    }

    pub fn kubeconfig_path(&self, id: &SessionId) -> PathBuf {
        self.home_dir(id).join(".kube").join("config")
    }

    /// Remove whatever a previous run left behind
    pub async fn reset(&self, id: &SessionId) -> std::io::Result<PathBuf> {
        let home = self.home_dir(id);
        match fs::remove_dir_all(&home).await {
            Ok(()) => debug!(session_id = %id, home = ?home, "Removed previous tool home"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        Ok(home)
    }

    /// Fresh private home directory holding the SSH public key
    pub async fn prepare(&self, id: &SessionId, ssh_public_key: &str) -> std::io::Result<PathBuf> {
        let home = self.reset(id).await?;
        fs::create_dir_all(&home).await?;
        set_mode(&home, 0o700).await?;

        let key_path = home.join(SSH_KEY_FILE);
        let mut options = fs::OpenOptions::new();
        options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&key_path).await?;
        file.write_all(ssh_public_key.as_bytes()).await?;
        file.flush().await?;

        debug!(session_id = %id, file = ?key_path, "SSH key saved");
        Ok(home)
    }

    /// Cluster access config written by the tool's create phase
    pub async fn read_kubeconfig(&self, id: &SessionId) -> std::io::Result<Vec<u8>> {
        fs::read(self.kubeconfig_path(id)).await
    }
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}
