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

//! Module containing the main error type

use crate::control::ControlError;
use crate::flows::CompileError;
use crate::planner::PlanError;
use crate::session::SessionError;
use crate::topology::TopologyError;
use thiserror::Error;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    /// Error propagated from the topology
    #[error("Topology Error: {0}")]
    TopologyError(#[from] TopologyError),
    /// Error propagated from the planner
    #[error("Planning Error: {0}")]
    PlanError(#[from] PlanError),
    /// Error propagated from the flow compiler
    #[error("Compilation Error: {0}")]
    CompileError(#[from] CompileError),
    /// Error propagated from the control plane
    #[error("Control Plane Error: {0}")]
    ControlError(#[from] ControlError),
    /// Error propagated from the session manager
    #[error("Session Error: {0}")]
    SessionError(#[from] SessionError),
    /// The topology description could not be read
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),
    /// The topology description could not be parsed
    #[error("JSON Error: {0}")]
    JsonError(#[from] serde_json::Error),
}
