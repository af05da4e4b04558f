// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::phase::Phase;
use crate::domain::session::SessionId;

/// Provisioning lifecycle events
///
/// Asynchronous phase outcomes are never returned to a caller; these events
/// are how observers learn about them besides polling the phase tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProvisioningEvent {
    PhaseChanged {
        session_id: SessionId,
        previous: Phase,
        current: Phase,
        changed_at: DateTime<Utc>,
    },
    TeardownFinished {
        session_id: SessionId,
        finished_at: DateTime<Utc>,
    },
    TeardownFailed {
        session_id: SessionId,
        step: String,
        reason: String,
        failed_at: DateTime<Utc>,
    },
}

impl ProvisioningEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            ProvisioningEvent::PhaseChanged { session_id, .. }
            | ProvisioningEvent::TeardownFinished { session_id, .. }
            | ProvisioningEvent::TeardownFailed { session_id, .. } => session_id,
        }
    }
}

/// Session store maintenance events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoreEvent {
    SessionsExpired {
        session_ids: Vec<SessionId>,
        swept_at: DateTime<Utc>,
    },
}
