// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Installer HTTP service
//!
//! Wires the session store, the provisioning services and the sweep loop
//! from configuration, serves the wizard API and shuts everything down in
//! order: stop accepting requests, stop the sweep, wait for in-flight
//! provisioning and teardown runs, then close the store.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, info, warn};

use kuberstack_core::{
    application::{
        BackgroundTasks, DeadlineGuard, PhaseTracker, ProvisioningOrchestrator,
        ProvisioningSettings, ReadinessProber, StandardSessionService, SweepConfig, SweepLoop,
        TeardownOrchestrator,
    },
    domain::{installer_config::InstallerConfigManifest, repository::SessionStore},
    infrastructure::{
        cloud::{create_cloud_connector, SystemHostResolver},
        event_bus::{DomainEvent, EventBus, EventBusError},
        ExitProcessOnTimeout, SessionWorkspace, SledSessionStore, SubprocessProvisioningTool,
    },
    presentation::api::{app, AppState},
};

/// Everything `serve` owns between startup and shutdown
pub struct Services {
    pub store: Arc<SledSessionStore>,
    pub tasks: BackgroundTasks,
    pub event_bus: EventBus,
    pub sweep: Arc<SweepLoop>,
    pub state: Arc<AppState>,
}

/// Build the service graph described by `config`
pub fn build_services(config: &InstallerConfigManifest) -> Result<Services> {
    let store_cfg = &config.spec.store;
    let provisioner_cfg = &config.spec.provisioner;

    let store = Arc::new(
        SledSessionStore::open(&store_cfg.path, store_cfg.ttl, store_cfg.file_mode)
            .with_context(|| format!("Failed to open session store at {:?}", store_cfg.path))?,
    );
    info!(store = %store.describe(), ttl = ?store_cfg.ttl, "Session store opened");

    std::fs::create_dir_all(&provisioner_cfg.work_dir).with_context(|| {
        format!("Failed to create work directory {:?}", provisioner_cfg.work_dir)
    })?;

    let event_bus = EventBus::with_default_capacity();
    let tracker = Arc::new(PhaseTracker::with_event_bus(event_bus.clone()));
    let tasks = BackgroundTasks::new();
    let workspace = SessionWorkspace::new(&provisioner_cfg.work_dir);
    let guard = DeadlineGuard::new(
        Arc::new(SubprocessProvisioningTool::new(&provisioner_cfg.tool_path)),
        Arc::new(ExitProcessOnTimeout::new()),
    );
    let settings = ProvisioningSettings {
        phase_timeout: provisioner_cfg.phase_timeout,
        rolling_update: provisioner_cfg.rolling_update,
    };

    let state = Arc::new(AppState {
        sessions: Arc::new(StandardSessionService::new(store.clone(), tracker.clone())),
        provisioning: ProvisioningOrchestrator::new(
            store.clone(),
            tracker.clone(),
            guard.clone(),
            workspace.clone(),
            tasks.clone(),
            settings.clone(),
        ),
        prober: Arc::new(ReadinessProber::new(
            store.clone(),
            tracker.clone(),
            guard.clone(),
            Arc::new(SystemHostResolver),
            workspace.clone(),
            settings.phase_timeout,
        )),
        teardown: TeardownOrchestrator::new(
            store.clone(),
            tracker,
            guard,
            create_cloud_connector(config.spec.cloud.backend),
            workspace,
            tasks.clone(),
            event_bus.clone(),
            settings.phase_timeout,
        ),
    });

    let sweep = Arc::new(SweepLoop::new(
        store.clone(),
        event_bus.clone(),
        SweepConfig {
            interval: store_cfg.sweep_interval,
        },
    ));

    Ok(Services {
        store,
        tasks,
        event_bus,
        sweep,
        state,
    })
}

/// Run the installer service until Ctrl+C or SIGTERM
pub async fn run(config: InstallerConfigManifest) -> Result<()> {
    config
        .validate()
        .context("Configuration validation failed")?;

    let services = build_services(&config)?;
    let event_log = tokio::spawn(log_events(services.event_bus.clone()));
    let sweep_token = services.sweep.shutdown_token();
    let sweep_handle = services.sweep.clone().start();

    let addr = format!(
        "{}:{}",
        config.spec.network.bind_address, config.spec.network.port
    );
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Installer listening on {}", addr);

    axum::serve(listener, app(services.state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Installer shutting down");

    sweep_token.cancel();
    if let Err(e) = sweep_handle.await {
        warn!("Sweep loop ended abnormally: {}", e);
    }

    let in_flight = services.tasks.in_flight();
    if in_flight > 0 {
        info!(in_flight, "Waiting for background provisioning runs to finish");
    }
    services.tasks.drain().await;

    event_log.abort();
    services
        .store
        .close()
        .await
        .context("Failed to close session store")?;

    info!("Installer stopped");
    Ok(())
}

async fn log_events(event_bus: EventBus) {
    let mut receiver = event_bus.subscribe();
    debug!(subscribers = event_bus.subscriber_count(), "Event log attached");
    loop {
        match receiver.recv().await {
            Ok(DomainEvent::Provisioning(event)) => {
                debug!(session_id = %event.session_id(), "Provisioning event: {:?}", event)
            }
            Ok(DomainEvent::Store(event)) => debug!("Store event: {:?}", event),
            Err(EventBusError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kuberstack_core::application::SessionService;

    #[tokio::test]
    async fn test_build_services_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = InstallerConfigManifest::default();
        config.spec.store.path = dir.path().join("sessions");
        config.spec.provisioner.work_dir = dir.path().join("work");

        let services = build_services(&config).unwrap();
        assert!(dir.path().join("work").is_dir());

        let id = services.state.sessions.open_session().await.unwrap();
        assert!(services.store.get(&id).await.unwrap().is_some());
        assert!(services.sweep.sweep_once().await.unwrap().is_empty());

        services.store.close().await.unwrap();
    }
}
