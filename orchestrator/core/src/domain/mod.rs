// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Session records, lifecycle phases and the contracts of every external
//! collaborator (store, provisioning tool, cloud providers).
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types and traits, no I/O

pub mod cloud;
pub mod events;
pub mod installer_config;
pub mod phase;
pub mod provisioner;
pub mod readiness;
pub mod repository;
pub mod session;
