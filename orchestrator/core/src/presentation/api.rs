// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP routes of the installer wizard.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::error;

use crate::application::provisioning::{ProvisioningError, ProvisioningOrchestrator};
use crate::application::readiness_prober::ReadinessProber;
use crate::application::session_service::{
    ClusterInput, CredentialsInput, DnsZoneInput, NodesInput, SessionError, SessionService,
};
use crate::application::teardown::TeardownOrchestrator;
use crate::domain::repository::StoreError;
use crate::domain::session::{NodeGroupSpec, SessionId, SessionRecord};

pub struct AppState {
    pub sessions: Arc<dyn SessionService>,
    pub provisioning: ProvisioningOrchestrator,
    pub prober: Arc<ReadinessProber>,
    pub teardown: TeardownOrchestrator,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/sessions", post(open_session_handler))
        .route("/sessions/{id}", get(get_session_handler))
        .route("/sessions/{id}/credentials", put(credentials_handler))
        .route("/sessions/{id}/cluster", put(cluster_handler))
        .route("/sessions/{id}/dns-zone", put(dns_zone_handler))
        .route("/sessions/{id}/nodes", put(nodes_handler))
        .route("/sessions/{id}/products", put(products_handler))
        .route("/sessions/{id}/provision", post(provision_handler))
        .route("/sessions/{id}/status", get(status_handler))
        .route("/sessions/{id}/kubeconfig", get(kubeconfig_handler))
        .route("/sessions/{id}/teardown", post(teardown_handler))
        .with_state(state)
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<Value>,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    fn internal(err: impl std::fmt::Display) -> Self {
        error!("Request failed: {}", err);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": self.code,
                "message": self.message,
                "details": self.details,
            }
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists(_) => Self::new(StatusCode::CONFLICT, "conflict", err.to_string()),
            StoreError::ConnectClosed => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "unavailable", err.to_string())
            }
            other => Self::internal(other),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, "not_found", err.to_string()),
            SessionError::InvalidInput(message) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_argument", message)
            }
            SessionError::RunInProgress(_) => {
                Self::new(StatusCode::CONFLICT, "run_in_progress", err.to_string())
            }
            SessionError::Store(e) => e.into(),
        }
    }
}

impl From<ProvisioningError> for ApiError {
    fn from(err: ProvisioningError) -> Self {
        match err {
            ProvisioningError::PreconditionFailed { ref missing } => {
                let details = json!({ "missing": missing });
                let mut api = Self::new(StatusCode::BAD_REQUEST, "precondition_failed", err.to_string());
                api.details = Some(details);
                api
            }
            ProvisioningError::SessionNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "not_found", err.to_string())
            }
            ProvisioningError::RunInProgress(_) => {
                Self::new(StatusCode::CONFLICT, "run_in_progress", err.to_string())
            }
            ProvisioningError::Store(e) => e.into(),
            ProvisioningError::Io(e) => Self::internal(e),
        }
    }
}

/// Session as shown to the client. Secrets and the cluster config stay out.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub region: String,
    pub domain: String,
    pub name: String,
    pub cluster_type: i64,
    pub zone_id: String,
    pub bucket: String,
    pub master: NodeGroupSpec,
    pub nodes: NodeGroupSpec,
    pub products: Vec<String>,
    pub has_credentials: bool,
    pub has_kubeconfig: bool,
    pub missing: Vec<String>,
}

impl SessionView {
    fn new(id: SessionId, record: SessionRecord) -> Self {
        Self {
            id,
            has_credentials: !record.access_key.is_empty() && !record.secret_key.is_empty(),
            has_kubeconfig: !record.kubeconfig.is_empty(),
            missing: record.missing_fields(),
            created_at: record.created_at,
            modified_at: record.modified_at,
            expires_at: record.expires_at,
            region: record.region,
            domain: record.domain,
            name: record.name,
            cluster_type: record.cluster_type,
            zone_id: record.zone_id,
            bucket: record.bucket,
            master: record.master,
            nodes: record.nodes,
            products: record.products,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProductsRequest {
    pub products: Vec<String>,
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn open_session_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let id = state.sessions.open_session().await?;
    Ok((StatusCode::CREATED, Json(json!({ "session_id": id }))))
}

async fn get_session_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let id = SessionId::new(id);
    let record = state.sessions.get_session(&id).await?;
    Ok(Json(SessionView::new(id, record)))
}

async fn credentials_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(input): Json<CredentialsInput>,
) -> Result<StatusCode, ApiError> {
    state.sessions.set_credentials(&SessionId::new(id), input).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn cluster_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(input): Json<ClusterInput>,
) -> Result<StatusCode, ApiError> {
    state.sessions.set_cluster(&SessionId::new(id), input).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn dns_zone_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(input): Json<DnsZoneInput>,
) -> Result<StatusCode, ApiError> {
    state.sessions.set_dns_zone(&SessionId::new(id), input).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn nodes_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(input): Json<NodesInput>,
) -> Result<StatusCode, ApiError> {
    state.sessions.set_nodes(&SessionId::new(id), input).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn products_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<ProductsRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .sessions
        .set_products(&SessionId::new(id), request.products)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn provision_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.provisioning.start(&SessionId::new(id)).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn status_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let report = state.prober.probe(&SessionId::new(id)).await?;
    Ok(Json(json!({
        "ready": report.ready,
        "phase": report.phase,
        "code": report.phase.code(),
    })))
}

async fn kubeconfig_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let kubeconfig = state.sessions.kubeconfig(&SessionId::new(id)).await?;
    if kubeconfig.is_empty() {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "not_found",
            "Cluster config not available yet",
        ));
    }
    Ok(([(header::CONTENT_TYPE, "application/yaml")], kubeconfig).into_response())
}

async fn teardown_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.teardown.start(&SessionId::new(id)).await?;
    Ok(StatusCode::ACCEPTED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::background::BackgroundTasks;
    use crate::application::phase_tracker::PhaseTracker;
    use crate::application::provisioning::ProvisioningSettings;
    use crate::application::session_service::StandardSessionService;
    use crate::application::watchdog::DeadlineGuard;
    use crate::domain::phase::Phase;
    use crate::domain::provisioner::{ProvisioningTool, ToolError, ToolInvocation, ToolOutput};
    use crate::infrastructure::cloud::memory::{InMemoryCloud, StaticHostResolver};
    use crate::infrastructure::event_bus::EventBus;
    use crate::infrastructure::session_store::SledSessionStore;
    use crate::infrastructure::timeout::RecordingTimeoutHandler;
    use crate::infrastructure::workspace::SessionWorkspace;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    struct KubeconfigTool;

    #[async_trait]
    impl ProvisioningTool for KubeconfigTool {
        async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
            let kube = invocation.home_dir.join(".kube");
            tokio::fs::create_dir_all(&kube).await.unwrap();
            tokio::fs::write(kube.join("config"), b"apiVersion: v1\n").await.unwrap();
            Ok(ToolOutput {
                output: String::new(),
            })
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        router: Router,
        tasks: BackgroundTasks,
        tracker: Arc<PhaseTracker>,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SledSessionStore::open(dir.path().join("db"), Duration::from_secs(600), 0o750).unwrap(),
        );
        let tracker = Arc::new(PhaseTracker::new());
        let tasks = BackgroundTasks::new();
        let guard = DeadlineGuard::new(Arc::new(KubeconfigTool), Arc::new(RecordingTimeoutHandler::new()));
        let workspace = SessionWorkspace::new(dir.path().join("work"));
        let timeout = Duration::from_secs(5);

        let state = Arc::new(AppState {
            sessions: Arc::new(StandardSessionService::new(store.clone(), tracker.clone())),
            provisioning: ProvisioningOrchestrator::new(
                store.clone(),
                tracker.clone(),
                guard.clone(),
                workspace.clone(),
                tasks.clone(),
                ProvisioningSettings {
                    phase_timeout: timeout,
                    rolling_update: false,
                },
            ),
            prober: Arc::new(ReadinessProber::new(
                store.clone(),
                tracker.clone(),
                guard.clone(),
                Arc::new(StaticHostResolver::new()),
                workspace.clone(),
                timeout,
            )),
            teardown: TeardownOrchestrator::new(
                store,
                tracker.clone(),
                guard,
                Arc::new(InMemoryCloud::new()),
                workspace,
                tasks.clone(),
                EventBus::new(16),
                timeout,
            ),
        });

        Harness {
            _dir: dir,
            router: app(state),
            tasks,
            tracker,
        }
    }

    async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    fn json_body(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    async fn open(router: &Router) -> String {
        let (status, body) = send(router, "POST", "/sessions", None).await;
        assert_eq!(status, StatusCode::CREATED);
        json_body(&body)["session_id"].as_str().unwrap().to_string()
    }

    fn group(quantity: i64, zones: &[&str]) -> Value {
        json!({
            "machine_type": "m4.large",
            "quantity": quantity,
            "zones": zones,
            "storage_size": 20,
            "storage_type": "gp2",
        })
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness();
        let (status, body) = send(&h.router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["status"], "healthy");
    }

    #[tokio::test]
    async fn test_wizard_flow_and_provisioning() {
        let h = harness();
        let id = open(&h.router).await;

        let steps = [
            (
                format!("/sessions/{id}/credentials"),
                json!({
                    "access_key": "AKIA",
                    "secret_key": "secret",
                    "region": "us-east-1",
                    "ssh_public_key": "ssh-rsa AAAA demo@host",
                }),
            ),
            (
                format!("/sessions/{id}/cluster"),
                json!({ "domain": "example.com", "name": "demo", "cluster_type": 1 }),
            ),
            (
                format!("/sessions/{id}/nodes"),
                json!({
                    "master": group(1, &["us-east-1a"]),
                    "nodes": group(2, &["us-east-1a", "us-east-1b"]),
                }),
            ),
            (
                format!("/sessions/{id}/products"),
                json!({ "products": ["monitoring"] }),
            ),
        ];
        for (uri, body) in steps {
            let (status, _) = send(&h.router, "PUT", &uri, Some(body)).await;
            assert_eq!(status, StatusCode::NO_CONTENT, "{uri}");
        }

        let (status, body) = send(&h.router, "GET", &format!("/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let view = json_body(&body);
        assert_eq!(view["domain"], "example.com.");
        assert_eq!(view["has_credentials"], true);
        assert!(view.get("secret_key").is_none());
        assert_eq!(view["missing"], json!([]));

        let (status, _) = send(&h.router, "GET", &format!("/sessions/{id}/kubeconfig"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&h.router, "POST", &format!("/sessions/{id}/provision"), None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        h.tasks.drain().await;
        assert_eq!(h.tracker.get(&SessionId::new(id.clone())), Phase::Rolled);

        let (status, body) = send(&h.router, "GET", &format!("/sessions/{id}/kubeconfig"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"apiVersion: v1\n");

        // Host does not resolve, so the cluster is not ready yet
        let (status, body) = send(&h.router, "GET", &format!("/sessions/{id}/status"), None).await;
        assert_eq!(status, StatusCode::OK);
        let report = json_body(&body);
        assert_eq!(report["ready"], false);
        assert_eq!(report["phase"], "rolled");
        assert_eq!(report["code"], 3);
    }

    #[tokio::test]
    async fn test_provision_precondition_lists_missing_fields() {
        let h = harness();
        let id = open(&h.router).await;

        let (status, body) = send(&h.router, "POST", &format!("/sessions/{id}/provision"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error = &json_body(&body)["error"];
        assert_eq!(error["code"], "precondition_failed");
        let missing = error["details"]["missing"].as_array().unwrap();
        assert!(missing.contains(&json!("Master.Quantity")));
        assert!(missing.contains(&json!("SSHPublicKey")));
    }

    #[tokio::test]
    async fn test_invalid_input_and_unknown_session() {
        let h = harness();
        let id = open(&h.router).await;

        let (status, body) = send(
            &h.router,
            "PUT",
            &format!("/sessions/{id}/nodes"),
            Some(json!({
                "master": group(1, &["us-east-1a"]),
                "nodes": { "machine_type": "t2.nano", "quantity": 1, "zones": ["a"], "storage_size": 20 },
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_body(&body)["error"]["code"], "invalid_argument");

        let (status, _) = send(&h.router, "GET", "/sessions/does-not-exist", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
