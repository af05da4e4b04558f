// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Kuberstack CLI

pub mod config;
pub mod sweep;

pub use self::config::ConfigCommand;
pub use self::sweep::SweepCommand;
