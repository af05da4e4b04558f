// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod background;
pub mod phase_tracker;
pub mod provisioning;
pub mod readiness_prober;
pub mod session_service;
pub mod sweep;
pub mod teardown;
pub mod watchdog;

// Re-export use cases for convenience
pub use background::BackgroundTasks;
pub use phase_tracker::PhaseTracker;
pub use provisioning::{ProvisioningError, ProvisioningOrchestrator, ProvisioningSettings};
pub use readiness_prober::{ReadinessProber, ReadinessReport};
pub use session_service::{SessionError, SessionService, StandardSessionService};
pub use sweep::{SweepConfig, SweepLoop};
pub use teardown::TeardownOrchestrator;
pub use watchdog::DeadlineGuard;
