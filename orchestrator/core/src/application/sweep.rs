// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Session Sweep Loop - Background eviction of expired session records
//!
//! Runs on its own fixed-interval timer, independent of any provisioning
//! work. A failed sweep is logged and retried on the next tick; the loop
//! ends when the store reports it was closed or on shutdown.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Periodic `SessionStore::cleanup`

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::domain::events::StoreEvent;
use crate::domain::repository::{SessionStore, StoreError};
use crate::domain::session::SessionId;
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

pub struct SweepLoop {
    store: Arc<dyn SessionStore>,
    event_bus: EventBus,
    config: SweepConfig,
    shutdown_token: tokio_util::sync::CancellationToken,
}

impl SweepLoop {
    pub fn new(store: Arc<dyn SessionStore>, event_bus: EventBus, config: SweepConfig) -> Self {
        Self {
            store,
            event_bus,
            config,
            shutdown_token: tokio_util::sync::CancellationToken::new(),
        }
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> tokio_util::sync::CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        info!(
            interval_ms = u64::try_from(self.config.interval.as_millis()).unwrap_or(u64::MAX),
            store = %self.store.describe(),
            "Starting session sweep loop"
        );

        let mut tick = interval(self.config.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    match self.sweep_once().await {
                        Ok(_) => {}
                        Err(StoreError::ConnectClosed) => {
                            info!("Session store closed, stopping sweep loop");
                            break;
                        }
                        Err(e) => {
                            warn!("Session sweep failed: {}", e);
                        }
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping sweep loop");
                    break;
                }
            }
        }

        info!("Session sweep loop stopped");
    }

    /// Execute a single sweep, logging every evicted id
    pub async fn sweep_once(&self) -> Result<Vec<SessionId>, StoreError> {
        let removed = self.store.cleanup().await?;

        if removed.is_empty() {
            debug!("Session sweep found nothing to remove");
            return Ok(removed);
        }

        for id in &removed {
            info!(session_id = %id, "Expired session removed");
        }

        self.event_bus.publish_store_event(StoreEvent::SessionsExpired {
            session_ids: removed.clone(),
            swept_at: Utc::now(),
        });

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::SessionRecord;
    use crate::infrastructure::event_bus::DomainEvent;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Store whose cleanup answers come from a script
    struct ScriptedStore {
        answers: Mutex<VecDeque<Result<Vec<SessionId>, StoreError>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedStore {
        fn new(answers: Vec<Result<Vec<SessionId>, StoreError>>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl SessionStore for ScriptedStore {
        async fn insert(&self, _id: &SessionId) -> Result<(), StoreError> {
            Ok(())
        }

        async fn save(&self, _id: &SessionId, _record: &mut SessionRecord) -> Result<(), StoreError> {
            Ok(())
        }

        async fn get(&self, _id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
            Ok(None)
        }

        async fn cleanup(&self) -> Result<Vec<SessionId>, StoreError> {
            *self.calls.lock() += 1;
            self.answers
                .lock()
                .pop_front()
                .unwrap_or(Err(StoreError::ConnectClosed))
        }

        async fn close(&self) -> Result<(), StoreError> {
            Ok(())
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    #[tokio::test]
    async fn test_sweep_once_publishes_removed_ids() {
        let store = Arc::new(ScriptedStore::new(vec![Ok(vec![SessionId::new("old")])]));
        let bus = EventBus::new(8);
        let mut receiver = bus.subscribe();
        let sweeper = SweepLoop::new(store, bus, SweepConfig::default());

        let removed = sweeper.sweep_once().await.unwrap();
        assert_eq!(removed, vec![SessionId::new("old")]);
        assert!(matches!(
            receiver.recv().await.unwrap(),
            DomainEvent::Store(StoreEvent::SessionsExpired { .. })
        ));
    }

    #[tokio::test]
    async fn test_loop_retries_errors_and_stops_when_closed() {
        let store = Arc::new(ScriptedStore::new(vec![
            Err(StoreError::Storage("disk hiccup".to_string())),
            Ok(vec![]),
            Err(StoreError::ConnectClosed),
        ]));
        let sweeper = Arc::new(SweepLoop::new(
            store.clone(),
            EventBus::new(8),
            SweepConfig {
                interval: Duration::from_millis(5),
            },
        ));

        let handle = sweeper.start();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop should stop on ConnectClosed")
            .unwrap();
        assert_eq!(store.calls(), 3);
    }

    #[tokio::test]
    async fn test_loop_stops_on_shutdown() {
        let store = Arc::new(ScriptedStore::new((0..1000).map(|_| Ok(vec![])).collect()));
        let sweeper = Arc::new(SweepLoop::new(
            store,
            EventBus::new(8),
            SweepConfig {
                interval: Duration::from_secs(3600),
            },
        ));
        let token = sweeper.shutdown_token();

        let handle = sweeper.start();
        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop should stop on cancellation")
            .unwrap();
    }
}
