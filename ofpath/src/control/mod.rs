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

//! # Control-Plane Client
//!
//! Interface to the running switches. A [`ControlPlane`] installs and removes single rules and
//! reads port counters. Batches of rules are handled by [`install_all`] and [`remove_all`], which
//! spread the work over multiple threads and bound the total time with a timeout.
//!
//! This crate ships the [`MemoryDataPlane`], which keeps the flow tables in memory. The client for
//! Open vSwitch lives in the `ofpath_runtime` crate.

mod batch;
mod memory;

pub use batch::{install_all, remove_all, BatchFailure, BatchOptions};
pub use memory::MemoryDataPlane;

use crate::flows::{FlowRule, RuleId};
use crate::topology::PortNo;

use serde::Serialize;
use std::time::SystemTime;
use thiserror::Error;

/// Traffic counters of a single switch port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PortCounters {
    /// Received packets
    pub rx_packets: u64,
    /// Transmitted packets
    pub tx_packets: u64,
    /// Received bytes
    pub rx_bytes: u64,
    /// Transmitted bytes
    pub tx_bytes: u64,
}

/// Counters of a switch port, together with the time at which they were read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    /// Name of the switch
    pub switch: String,
    /// Port on the switch
    pub port: PortNo,
    /// Counter values
    #[serde(flatten)]
    pub counters: PortCounters,
    /// Time of the reading
    pub timestamp: SystemTime,
}

impl CounterSnapshot {
    /// Create a snapshot taken now
    pub fn now(switch: impl Into<String>, port: PortNo, counters: PortCounters) -> Self {
        Self { switch: switch.into(), port, counters, timestamp: SystemTime::now() }
    }
}

/// Traffic that matched a single installed rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowStats {
    /// The rule
    pub rule: RuleId,
    /// Number of matched packets
    pub n_packets: u64,
    /// Number of matched bytes
    pub n_bytes: u64,
}

/// Control-Plane Errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControlError {
    /// The switch could not be reached, rejected the request, or did not answer in time.
    #[error("Control channel to {switch} failed: {reason}")]
    ControlChannel {
        /// switch name
        switch: String,
        /// description of the failure
        reason: String,
    },
    /// The counters could not be read. This is transient and never fatal.
    #[error("Counters of {switch} port {port} are unavailable: {reason}")]
    CounterUnavailable {
        /// switch name
        switch: String,
        /// port number
        port: PortNo,
        /// description of the failure
        reason: String,
    },
    /// The control plane does not implement the operation
    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),
}

impl ControlError {
    /// Shorthand for a [`ControlError::ControlChannel`]
    pub fn channel(switch: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ControlChannel { switch: switch.into(), reason: reason.into() }
    }

    /// Returns true if the error does not indicate a problem with the data plane state.
    pub fn is_soft(&self) -> bool {
        !matches!(self, Self::ControlChannel { .. })
    }
}

/// # Control Plane
///
/// Every call is a single request-response exchange with one switch, and must return within a
/// bounded time (reporting [`ControlError::ControlChannel`] otherwise). Both `install` and
/// `remove` must be idempotent: installing the same rule twice leaves one rule in the table, and
/// removing an absent rule succeeds.
///
/// The trait requires `Send + Sync`, since batches are handled by multiple threads at once, and
/// counters are read while a batch is running.
pub trait ControlPlane: Send + Sync {
    /// Install the rule on its switch, replacing a rule with the same identifier.
    fn install(&self, rule: &FlowRule) -> Result<(), ControlError>;

    /// Remove the rule from its switch. Succeeds if the rule is not installed.
    fn remove(&self, rule: &RuleId) -> Result<(), ControlError>;

    /// Read the traffic counters of a switch port.
    fn read_counters(&self, switch: &str, port: PortNo) -> Result<PortCounters, ControlError>;

    /// Read how much traffic matched an installed rule. Returns `None` if the rule is not
    /// installed on the switch.
    fn read_flow_stats(&self, _rule: &RuleId) -> Result<Option<FlowStats>, ControlError> {
        Err(ControlError::Unsupported("flow statistics"))
    }
}
