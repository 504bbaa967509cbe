// ofpath: Planning Paths and Compiling them into OpenFlow Rules
// Copyright (C) 2021  The ofpath developers
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! State machine of a single host pair.

use super::SessionError;
use crate::flows::PathId;

use serde::Serialize;
use std::fmt;

/// # Pair State
///
/// ```text
/// NoPath --> Installing --> Active --> TearingDown --> NoPath
///                 |                         |
///                 v                         v (removal failed)
///              Failed                     Active
/// ```
///
/// A pair in the `Failed` state may start a new installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PairState {
    /// No path is installed
    NoPath,
    /// The rules of the path are being installed
    Installing {
        /// path being installed
        path: PathId,
    },
    /// All rules of the path are installed
    Active {
        /// installed path
        path: PathId,
    },
    /// The rules of the path are being removed
    TearingDown {
        /// path being removed
        path: PathId,
    },
    /// The last installation failed, and its rules were rolled back
    Failed {
        /// path that could not be installed
        path: PathId,
        /// reason of the failure
        reason: String,
    },
}

impl Default for PairState {
    fn default() -> Self {
        Self::NoPath
    }
}

impl fmt::Display for PairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPath => write!(f, "NoPath"),
            Self::Installing { path } => write!(f, "Installing({})", path),
            Self::Active { path } => write!(f, "Active({})", path),
            Self::TearingDown { path } => write!(f, "TearingDown({})", path),
            Self::Failed { path, reason } => write!(f, "Failed({}: {})", path, reason),
        }
    }
}

/// Event that drives the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairEvent {
    /// Start installing the rules of a new path
    BeginInstall(PathId),
    /// All rules are installed
    InstallSucceeded,
    /// The batch failed and was rolled back
    InstallFailed(String),
    /// Start removing the rules of the active path
    BeginTeardown,
    /// All rules are removed
    TeardownFinished,
    /// Some rules could not be removed. The path stays active, such that the teardown can be
    /// retried.
    TeardownFailed,
}

impl PairState {
    /// Compute the next state, or return [`SessionError::InvalidTransition`] if the event is not
    /// allowed in the current state.
    pub fn next(&self, event: &PairEvent) -> Result<PairState, SessionError> {
        use PairEvent::*;
        use PairState::*;
        match (self, event) {
            (NoPath, BeginInstall(id)) | (Failed { .. }, BeginInstall(id)) => {
                Ok(Installing { path: *id })
            }
            (Installing { path }, InstallSucceeded) => Ok(Active { path: *path }),
            (Installing { path }, InstallFailed(reason)) => {
                Ok(Failed { path: *path, reason: reason.clone() })
            }
            (Active { path }, BeginTeardown) => Ok(TearingDown { path: *path }),
            (TearingDown { .. }, TeardownFinished) => Ok(NoPath),
            (TearingDown { path }, TeardownFailed) => Ok(Active { path: *path }),
            (state, event) => {
                Err(SessionError::InvalidTransition(format!("{:?} in state {}", event, state)))
            }
        }
    }

    /// Returns the id of the installed path, if the pair is active
    pub fn active_path(&self) -> Option<PathId> {
        match self {
            Self::Active { path } => Some(*path),
            _ => None,
        }
    }

    /// Returns true if no rules of the pair are installed or being installed
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::NoPath | Self::Failed { .. })
    }
}
