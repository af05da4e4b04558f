// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! A tool run that outlives its deadline must take the whole process down.
//! The fatal case re-executes this test binary and checks the child's exit
//! status.

#![cfg(unix)]

use std::collections::BTreeMap;
use std::process::Command;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kuberstack_core::application::DeadlineGuard;
use kuberstack_core::domain::provisioner::{ToolError, ToolInvocation, ToolPhase};
use kuberstack_core::domain::session::SessionId;
use kuberstack_core::infrastructure::{
    ExitProcessOnTimeout, RecordingTimeoutHandler, SubprocessProvisioningTool, TIMEOUT_EXIT_CODE,
};

const CHILD_ENV: &str = "KUBERSTACK_DEADLINE_CHILD";

fn slow_invocation(deadline: Duration) -> ToolInvocation {
    ToolInvocation {
        session_id: SessionId::new("slow"),
        phase: ToolPhase::Create,
        args: vec!["-c".to_string(), "sleep 30".to_string()],
        env: BTreeMap::new(),
        home_dir: std::env::temp_dir(),
        deadline,
    }
}

#[tokio::test]
async fn test_deadline_overrun_exits_process() {
    if std::env::var_os(CHILD_ENV).is_some() {
        let guard = DeadlineGuard::new(
            Arc::new(SubprocessProvisioningTool::new("/bin/sh")),
            Arc::new(ExitProcessOnTimeout::new()),
        );
        let _ = guard.run(&slow_invocation(Duration::from_millis(200))).await;
        // Reaching this point means the process survived the overrun
        std::process::exit(0);
    }

    let started = Instant::now();
    let status = Command::new(std::env::current_exe().unwrap())
        .args([
            "--exact",
            "test_deadline_overrun_exits_process",
            "--test-threads=1",
            "--nocapture",
        ])
        .env(CHILD_ENV, "1")
        .status()
        .unwrap();

    assert_eq!(status.code(), Some(TIMEOUT_EXIT_CODE));
    assert!(started.elapsed() < Duration::from_secs(25));
}

#[tokio::test]
async fn test_recording_handler_kills_only_the_run() {
    let handler = Arc::new(RecordingTimeoutHandler::new());
    let guard = DeadlineGuard::new(
        Arc::new(SubprocessProvisioningTool::new("/bin/sh")),
        handler.clone(),
    );

    let started = Instant::now();
    let err = guard
        .run(&slow_invocation(Duration::from_millis(200)))
        .await
        .unwrap_err();

    assert!(matches!(err, ToolError::Timeout { phase: ToolPhase::Create, .. }));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(handler.fired(), vec![(SessionId::new("slow"), ToolPhase::Create)]);
}
