// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Detached background work
//!
//! Provisioning and teardown outlive the request that triggered them. Each
//! run is spawned as its own task and watched by a tracked supervisor that
//! logs panics, so `drain` can wait for all of them at shutdown or in tests.

use std::future::Future;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use crate::domain::session::SessionId;

#[derive(Clone, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` detached from the caller
    pub fn spawn<F>(&self, name: &'static str, session_id: SessionId, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        self.tracker.spawn(async move {
            match handle.await {
                Ok(()) => debug!(task = name, session_id = %session_id, "Background task finished"),
                Err(e) if e.is_panic() => {
                    error!(task = name, session_id = %session_id, "Background task panicked")
                }
                Err(e) => warn!(task = name, session_id = %session_id, error = %e, "Background task cancelled"),
            }
        });
    }

    /// Number of runs still in flight
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every spawned run has finished
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
