// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Kuberstack installer core
//!
//! Session persistence with expiry, the provisioning phase machine, the
//! readiness probe and teardown of everything a session created.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain, application, infrastructure and HTTP layers

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
