// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Structural readiness check over the output of the tool's validate phase.

use regex::Regex;
use std::sync::LazyLock;

// A `NODE STATUS` block whose every row reports a node or master role in the
// `True` ready state, closed by a blank line.
static READY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"NODE\s+STATUS\s*\nNAME\s+ROLE\s+READY\s*\n(?:[^\s]+\s+(?:(?:node)|(?:master))\s+True\s*\n)+\s*\n",
    )
    .unwrap_or_else(|e| panic!("invalid readiness pattern: {e}"))
});

/// True when `output` reports every cluster member ready
pub fn is_cluster_ready(output: &str) -> bool {
    READY_PATTERN.is_match(output)
}
