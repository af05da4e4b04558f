// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use parking_lot::Mutex;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use kuberstack_core::application::session_service::{
    ClusterInput, CredentialsInput, DnsZoneInput, NodesInput,
};
use kuberstack_core::application::{
    BackgroundTasks, DeadlineGuard, PhaseTracker, ProvisioningError, ProvisioningOrchestrator,
    ProvisioningSettings, ReadinessProber, SessionService, StandardSessionService,
    TeardownOrchestrator,
};
use kuberstack_core::domain::events::ProvisioningEvent;
use kuberstack_core::domain::phase::Phase;
use kuberstack_core::domain::provisioner::{
    ProvisioningTool, ToolError, ToolInvocation, ToolOutput, ToolPhase,
};
use kuberstack_core::domain::session::{NodeGroupSpec, SessionId};
use kuberstack_core::domain::cloud::MAX_DELETE_BATCH;
use kuberstack_core::infrastructure::cloud::{InMemoryCloud, StaticHostResolver};
use kuberstack_core::infrastructure::event_bus::EventBus;
use kuberstack_core::infrastructure::{RecordingTimeoutHandler, SessionWorkspace, SledSessionStore};

const VALIDATE_READY: &str = "INSTANCE GROUPS\n\
    NAME\t\t\tROLE\tMACHINETYPE\tMIN\tMAX\tSUBNETS\n\
    master-us-east-1a\tMaster\tm4.large\t1\t1\tus-east-1a\n\
    \n\
    NODE STATUS\n\
    NAME\t\t\t\tROLE\tREADY\n\
    ip-172-20-33-1.ec2.internal\tmaster\tTrue\n\
    ip-172-20-45-9.ec2.internal\tnode\tTrue\n\
    \n\
    Your cluster demo.example.com is ready\n";

/// Stand-in for the provisioning tool: records every run, writes the
/// cluster config on create and answers validate with a canned report.
struct ScriptedTool {
    validate_output: Mutex<String>,
    runs: Mutex<Vec<(ToolPhase, Vec<String>)>>,
}

impl ScriptedTool {
    fn new() -> Self {
        Self {
            validate_output: Mutex::new(String::new()),
            runs: Mutex::new(Vec::new()),
        }
    }

    fn phases(&self) -> Vec<ToolPhase> {
        self.runs.lock().iter().map(|(phase, _)| *phase).collect()
    }
}

#[async_trait]
impl ProvisioningTool for ScriptedTool {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        self.runs
            .lock()
            .push((invocation.phase, invocation.args.clone()));

        let output = match invocation.phase {
            ToolPhase::Create => {
                let kube = invocation.home_dir.join(".kube");
                tokio::fs::create_dir_all(&kube)
                    .await
                    .map_err(|e| ToolError::Io(e.to_string()))?;
                tokio::fs::write(kube.join("config"), b"apiVersion: v1\nkind: Config\n")
                    .await
                    .map_err(|e| ToolError::Io(e.to_string()))?;
                String::new()
            }
            ToolPhase::Validate => self.validate_output.lock().clone(),
            _ => String::new(),
        };
        Ok(ToolOutput { output })
    }
}

struct Installer {
    _dir: tempfile::TempDir,
    sessions: StandardSessionService,
    provisioning: ProvisioningOrchestrator,
    prober: ReadinessProber,
    teardown: TeardownOrchestrator,
    tracker: Arc<PhaseTracker>,
    tasks: BackgroundTasks,
    tool: Arc<ScriptedTool>,
    cloud: InMemoryCloud,
    resolver: Arc<StaticHostResolver>,
    event_bus: EventBus,
}

fn installer() -> Installer {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(
        SledSessionStore::open(dir.path().join("sessions"), Duration::from_secs(3600), 0o750)
            .unwrap(),
    );
    let event_bus = EventBus::new(256);
    let tracker = Arc::new(PhaseTracker::with_event_bus(event_bus.clone()));
    let tasks = BackgroundTasks::new();
    let tool = Arc::new(ScriptedTool::new());
    let guard = DeadlineGuard::new(tool.clone(), Arc::new(RecordingTimeoutHandler::new()));
    let workspace = SessionWorkspace::new(dir.path().join("work"));
    let cloud = InMemoryCloud::new();
    let resolver = Arc::new(StaticHostResolver::new());
    let timeout = Duration::from_secs(10);

    Installer {
        sessions: StandardSessionService::new(store.clone(), tracker.clone()),
        provisioning: ProvisioningOrchestrator::new(
            store.clone(),
            tracker.clone(),
            guard.clone(),
            workspace.clone(),
            tasks.clone(),
            ProvisioningSettings {
                phase_timeout: timeout,
                rolling_update: true,
            },
        ),
        prober: ReadinessProber::new(
            store.clone(),
            tracker.clone(),
            guard.clone(),
            resolver.clone(),
            workspace.clone(),
            timeout,
        ),
        teardown: TeardownOrchestrator::new(
            store,
            tracker.clone(),
            guard,
            Arc::new(cloud.clone()),
            workspace,
            tasks.clone(),
            event_bus.clone(),
            timeout,
        ),
        _dir: dir,
        tracker,
        tasks,
        tool,
        cloud,
        resolver,
        event_bus,
    }
}

fn group(machine_type: &str, quantity: i64, zones: &[&str]) -> NodeGroupSpec {
    NodeGroupSpec {
        machine_type: machine_type.to_string(),
        quantity,
        zones: zones.iter().map(|z| z.to_string()).collect(),
        storage_size: 30,
        storage_type: "gp2".to_string(),
    }
}

async fn configured_session(installer: &Installer) -> SessionId {
    let sessions = &installer.sessions;
    let id = sessions.open_session().await.unwrap();

    sessions
        .set_credentials(
            &id,
            CredentialsInput {
                access_key: "AKIAEXAMPLE".to_string(),
                secret_key: "secret".to_string(),
                region: "us-east-1".to_string(),
                ssh_public_key: "ssh-rsa AAAAB3NzaC1yc2E demo@host".to_string(),
            },
        )
        .await
        .unwrap();
    sessions
        .set_cluster(
            &id,
            ClusterInput {
                domain: "example.com".to_string(),
                name: "demo".to_string(),
                cluster_type: 1,
            },
        )
        .await
        .unwrap();
    sessions
        .set_dns_zone(
            &id,
            DnsZoneInput {
                zone_id: "/hostedzone/Z1".to_string(),
                zone_change_id: "C1".to_string(),
                record_change_id: "C2".to_string(),
            },
        )
        .await
        .unwrap();
    sessions
        .set_nodes(
            &id,
            NodesInput {
                master: group("m4.large", 1, &["us-east-1a"]),
                nodes: group("t2.medium", 2, &["us-east-1a", "us-east-1b"]),
            },
        )
        .await
        .unwrap();
    id
}

#[tokio::test]
async fn test_provision_then_probe_until_ready() {
    let installer = installer();
    let id = configured_session(&installer).await;

    installer.provisioning.start(&id).await.unwrap();
    installer.tasks.drain().await;

    assert_eq!(installer.tracker.get(&id), Phase::Rolled);
    assert_eq!(
        installer.tool.phases(),
        vec![ToolPhase::Create, ToolPhase::Update, ToolPhase::RollingUpdate]
    );
    let create_args = installer.tool.runs.lock()[0].1.clone();
    assert!(create_args.contains(&format!("--state=s3://{}", id.storage_container_name())));
    assert!(create_args.contains(&"--name=demo.example.com".to_string()));
    assert_eq!(
        installer.sessions.kubeconfig(&id).await.unwrap(),
        b"apiVersion: v1\nkind: Config\n"
    );

    // Endpoint not published yet
    let report = installer.prober.probe(&id).await.unwrap();
    assert!(!report.ready);

    installer
        .resolver
        .insert("api.demo.example.com", IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)));

    // Members still joining
    *installer.tool.validate_output.lock() = VALIDATE_READY.replace("node\tTrue", "node\tFalse");
    let report = installer.prober.probe(&id).await.unwrap();
    assert!(!report.ready);
    assert_eq!(installer.tracker.get(&id), Phase::Rolled);

    *installer.tool.validate_output.lock() = VALIDATE_READY.to_string();
    let report = installer.prober.probe(&id).await.unwrap();
    assert!(report.ready);
    assert_eq!(installer.tracker.get(&id), Phase::Ready);
}

#[tokio::test]
async fn test_precondition_reports_all_missing_fields() {
    let installer = installer();
    let id = installer.sessions.open_session().await.unwrap();
    installer
        .sessions
        .set_cluster(
            &id,
            ClusterInput {
                domain: "example.com".to_string(),
                name: "demo".to_string(),
                cluster_type: 0,
            },
        )
        .await
        .unwrap();

    let err = installer.provisioning.start(&id).await.unwrap_err();
    let message = err.to_string();
    match err {
        ProvisioningError::PreconditionFailed { missing } => {
            assert!(missing.contains(&"Master.Quantity".to_string()));
            assert!(missing.contains(&"SSHPublicKey".to_string()));
            assert!(missing.iter().all(|field| message.contains(field.as_str())));
        }
        other => panic!("unexpected error: {other}"),
    }

    installer.tasks.drain().await;
    assert!(installer.tool.phases().is_empty());
}

#[tokio::test]
async fn test_teardown_removes_cluster_zone_and_bucket() {
    let installer = installer();
    let id = configured_session(&installer).await;
    let bucket = id.storage_container_name();

    installer.cloud.create_zone("demo.example.com.");
    installer.cloud.create_bucket(&bucket);
    for i in 0..1500 {
        installer
            .cloud
            .put_object(&bucket, &format!("demo.example.com/state/{:04}", i))
            .unwrap();
    }
    installer.tracker.set(&id, Phase::Ready);

    let mut events = installer.event_bus.subscribe_session(id.clone());
    installer.teardown.start(&id).await.unwrap();

    // Cleared as soon as teardown is accepted
    assert_eq!(installer.tracker.get(&id), Phase::Initial);

    installer.tasks.drain().await;

    assert_eq!(installer.tool.phases(), vec![ToolPhase::Delete]);
    assert!(!installer.cloud.zone_exists("demo.example.com."));
    assert!(!installer.cloud.bucket_exists(&bucket));

    let batches = installer.cloud.delete_batches();
    assert!(batches.len() >= 2);
    assert!(batches.iter().all(|n| *n <= MAX_DELETE_BATCH));

    loop {
        match events.recv().await.unwrap() {
            ProvisioningEvent::TeardownFinished { session_id, .. } => {
                assert_eq!(session_id, id);
                break;
            }
            ProvisioningEvent::TeardownFailed { step, reason, .. } => {
                panic!("teardown failed at {step}: {reason}")
            }
            ProvisioningEvent::PhaseChanged { .. } => {}
        }
    }
}

#[tokio::test]
async fn test_teardown_stops_when_zone_is_missing() {
    let installer = installer();
    let id = configured_session(&installer).await;
    let bucket = id.storage_container_name();
    installer.cloud.create_bucket(&bucket);
    installer.cloud.put_object(&bucket, "state").unwrap();

    let mut events = installer.event_bus.subscribe_session(id.clone());
    installer.teardown.start(&id).await.unwrap();
    installer.tasks.drain().await;

    match events.recv().await.unwrap() {
        ProvisioningEvent::TeardownFailed { step, reason, .. } => {
            assert_eq!(step, "delete-zone");
            assert!(reason.contains("demo.example.com."));
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(installer.cloud.bucket_exists(&bucket));
    assert_eq!(installer.cloud.bucket_entry_count(&bucket), 2);
}
