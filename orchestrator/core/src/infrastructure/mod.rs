// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod cloud;
pub mod event_bus;
pub mod session_store;
pub mod timeout;
pub mod tool_runner;
pub mod workspace;

pub use session_store::SledSessionStore;
pub use timeout::{ExitProcessOnTimeout, RecordingTimeoutHandler, TIMEOUT_EXIT_CODE};
pub use tool_runner::SubprocessProvisioningTool;
pub use workspace::SessionWorkspace;
