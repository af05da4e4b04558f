// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Provisioning lifecycle phases
//!
//! ```text
//! Initial -> Created -> Updated -> Rolled -> Ready
//!    \-> Failed (from any non-terminal phase)
//! ```
//!
//! Variants are declared in numeric order so the derived `Ord` matches the
//! wire codes (`Failed` = -1 sorts below everything).

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Failed,
    #[default]
    Initial,
    Created,
    Updated,
    Rolled,
    Ready,
}

impl Phase {
    /// Numeric status code reported to polling clients
    pub fn code(self) -> i8 {
        match self {
            Phase::Failed => -1,
            Phase::Initial => 0,
            Phase::Created => 1,
            Phase::Updated => 2,
            Phase::Rolled => 3,
            Phase::Ready => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Failed | Phase::Ready)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Failed => "failed",
            Phase::Initial => "initial",
            Phase::Created => "created",
            Phase::Updated => "updated",
            Phase::Rolled => "rolled",
            Phase::Ready => "ready",
        };
        f.write_str(name)
    }
}
