// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Phase Tracker
//!
//! In-memory map of session id to the furthest lifecycle phase reached.
//! Constructed empty at startup and never persisted: after a restart every
//! session reports `Initial` again even though its record survived.
//!
//! The tracker also knows which sessions have a provisioning or teardown run
//! in flight. A run holds a [`RunGuard`] for its whole lifetime.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::domain::events::ProvisioningEvent;
use crate::domain::phase::Phase;
use crate::domain::session::SessionId;
use crate::infrastructure::event_bus::EventBus;

pub struct PhaseTracker {
    phases: Mutex<HashMap<SessionId, Phase>>,
    runs: Mutex<HashSet<SessionId>>,
    event_bus: Option<EventBus>,
}

/// Marks a session's run as in flight until dropped
pub struct RunGuard {
    tracker: Arc<PhaseTracker>,
    session_id: SessionId,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.tracker.runs.lock().remove(&self.session_id);
        debug!(session_id = %self.session_id, "Run released");
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            phases: Mutex::new(HashMap::new()),
            runs: Mutex::new(HashSet::new()),
            event_bus: None,
        }
    }

    pub fn with_event_bus(event_bus: EventBus) -> Self {
        Self {
            phases: Mutex::new(HashMap::new()),
            runs: Mutex::new(HashSet::new()),
            event_bus: Some(event_bus),
        }
    }

    /// Current phase, `Initial` when the session has no entry
    pub fn get(&self, id: &SessionId) -> Phase {
        self.phases.lock().get(id).copied().unwrap_or_default()
    }

    pub fn set(&self, id: &SessionId, phase: Phase) {
        let previous = self
            .phases
            .lock()
            .insert(id.clone(), phase)
            .unwrap_or_default();

        debug!(session_id = %id, %previous, current = %phase, "Phase changed");

        if let Some(bus) = &self.event_bus {
            bus.publish_provisioning_event(ProvisioningEvent::PhaseChanged {
                session_id: id.clone(),
                previous,
                current: phase,
                changed_at: Utc::now(),
            });
        }
    }

    /// Drop the entry, the session reads as `Initial` afterwards
    pub fn clear(&self, id: &SessionId) {
        if self.phases.lock().remove(id).is_some() {
            debug!(session_id = %id, "Phase cleared");
        }
    }

    /// Claim `id` for a run, `None` while another run holds it
    pub fn begin_run(self: &Arc<Self>, id: &SessionId) -> Option<RunGuard> {
        if !self.runs.lock().insert(id.clone()) {
            return None;
        }
        Some(RunGuard {
            tracker: Arc::clone(self),
            session_id: id.clone(),
        })
    }

    pub fn is_running(&self, id: &SessionId) -> bool {
        self.runs.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.phases.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::event_bus::DomainEvent;

    #[test]
    fn test_unknown_session_is_initial() {
        let tracker = PhaseTracker::new();
        assert_eq!(tracker.get(&SessionId::new("nobody")), Phase::Initial);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_set_and_clear() {
        let tracker = PhaseTracker::new();
        let id = SessionId::new("s");

        tracker.set(&id, Phase::Created);
        tracker.set(&id, Phase::Updated);
        assert_eq!(tracker.get(&id), Phase::Updated);
        assert_eq!(tracker.len(), 1);

        tracker.clear(&id);
        assert_eq!(tracker.get(&id), Phase::Initial);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_sessions_are_independent() {
        let tracker = PhaseTracker::new();
        tracker.set(&SessionId::new("a"), Phase::Failed);
        tracker.set(&SessionId::new("b"), Phase::Ready);

        assert_eq!(tracker.get(&SessionId::new("a")), Phase::Failed);
        assert_eq!(tracker.get(&SessionId::new("b")), Phase::Ready);
    }

    #[test]
    fn test_run_guard_is_exclusive_per_session() {
        let tracker = Arc::new(PhaseTracker::new());
        let id = SessionId::new("s");

        let guard = tracker.begin_run(&id).expect("first run");
        assert!(tracker.is_running(&id));
        assert!(tracker.begin_run(&id).is_none());
        assert!(tracker.begin_run(&SessionId::new("other")).is_some());

        drop(guard);
        assert!(!tracker.is_running(&id));
        assert!(tracker.begin_run(&id).is_some());
    }

    #[tokio::test]
    async fn test_transitions_are_published() {
        let bus = EventBus::new(8);
        let mut receiver = bus.subscribe();
        let tracker = PhaseTracker::with_event_bus(bus);
        let id = SessionId::new("s");

        tracker.set(&id, Phase::Created);

        match receiver.recv().await.unwrap() {
            DomainEvent::Provisioning(ProvisioningEvent::PhaseChanged {
                previous, current, ..
            }) => {
                assert_eq!(previous, Phase::Initial);
                assert_eq!(current, Phase::Created);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
