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

//! # Flow Compiler
//!
//! Translates a [`Path`](crate::planner::Path) into the flow rules that the switches along the
//! path need to forward traffic in both directions. Every switch on the path receives exactly two
//! rules, one per direction, whose ports are taken from the port mapping of the topology.

mod compiler;

pub use compiler::compile;

use crate::topology::{MacAddr, PortNo, TopologyError};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Priority of every rule installed for a path.
pub const PATH_PRIORITY: u16 = 1000;
/// Priority of the default forwarding behavior of the switches (learning switch / table miss).
pub const DEFAULT_FORWARDING_PRIORITY: u16 = 0;
/// Upper bits of every cookie, such that rules of this crate can be told apart from others.
pub const COOKIE_TAG: u64 = 0x6f70_0000_0000_0000;
/// Mask selecting the bits of the cookie which are derived from the rule.
pub const COOKIE_MASK: u64 = 0x0000_ffff_ffff_ffff;

/// Identifier of a path, assigned monotonically by the session manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PathId(pub u32);

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "path{}", self.0)
    }
}

/// Direction of traffic on the path
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// From the source host to the destination host
    Forward,
    /// From the destination host back to the source host
    Reverse,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward => write!(f, "forward"),
            Self::Reverse => write!(f, "reverse"),
        }
    }
}

/// # Rule Identifier
/// Stable identifier of a rule, derived from the path, the switch and the direction. The same
/// path compiled twice yields the same identifiers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RuleId {
    /// Path to which the rule belongs
    pub path: PathId,
    /// Name of the switch on which the rule is installed
    pub switch: String,
    /// Direction of the traffic matched by the rule
    pub direction: Direction,
}

impl RuleId {
    /// Create a new rule identifier
    pub fn new(path: PathId, switch: impl Into<String>, direction: Direction) -> Self {
        Self { path, switch: switch.into(), direction }
    }

    /// OpenFlow cookie of the rule. The switch is not part of the cookie, since every rule is
    /// addressed to a single switch, and a path visits every switch at most once.
    pub fn cookie(&self) -> u64 {
        let direction = match self.direction {
            Direction::Forward => 0,
            Direction::Reverse => 1,
        };
        COOKIE_TAG | ((((self.path.0 as u64) << 1) | direction) & COOKIE_MASK)
    }

    /// Reconstruct the path and the direction from a cookie. Returns `None` if the cookie was not
    /// generated by [`RuleId::cookie`].
    pub fn parse_cookie(cookie: u64) -> Option<(PathId, Direction)> {
        if cookie & !COOKIE_MASK != COOKIE_TAG {
            return None;
        }
        let bits = cookie & COOKIE_MASK;
        let direction = if bits & 1 == 0 { Direction::Forward } else { Direction::Reverse };
        Some((PathId((bits >> 1) as u32), direction))
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.path, self.switch, self.direction)
    }
}

/// Match on the addresses of the two endpoint hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classifier {
    /// Match on the Ethernet source and destination
    Ethernet {
        /// source address
        src: MacAddr,
        /// destination address
        dst: MacAddr,
    },
    /// Match on IPv4 packets with the given source and destination
    Ipv4 {
        /// source address
        src: Ipv4Addr,
        /// destination address
        dst: Ipv4Addr,
    },
}

impl Classifier {
    /// Returns the classifier with source and destination swapped
    pub fn reversed(&self) -> Self {
        match *self {
            Self::Ethernet { src, dst } => Self::Ethernet { src: dst, dst: src },
            Self::Ipv4 { src, dst } => Self::Ipv4 { src: dst, dst: src },
        }
    }
}

impl fmt::Display for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ethernet { src, dst } => write!(f, "eth {} -> {}", src, dst),
            Self::Ipv4 { src, dst } => write!(f, "ip {} -> {}", src, dst),
        }
    }
}

/// # Flow Rule
/// Match-action instruction for a single switch: packets entering on `in_port` and matching the
/// classifier are sent out on `out_port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowRule {
    /// Stable identifier of the rule
    pub id: RuleId,
    /// Ingress port
    pub in_port: PortNo,
    /// Egress port
    pub out_port: PortNo,
    /// Addresses of the endpoint hosts
    pub classifier: Classifier,
    /// Priority of the rule, always above [`DEFAULT_FORWARDING_PRIORITY`]
    pub priority: u16,
}

impl FlowRule {
    /// Name of the switch on which the rule is installed
    pub fn switch(&self) -> &str {
        &self.id.switch
    }
}

impl fmt::Display for FlowRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: in_port={} {} => output:{} (priority {})",
            self.id, self.in_port, self.classifier, self.out_port, self.priority
        )
    }
}

/// Compilation Errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// A switch on the path has no port towards its path neighbor. This indicates a path that was
    /// not planned on this graph.
    #[error("Interrupted path: {switch} has no port towards {neighbor}")]
    InterruptedPath {
        /// switch on the path
        switch: String,
        /// neighbor on the path without a port mapping
        neighbor: String,
    },
    /// An interior node of the path is not a switch
    #[error("Node {0} on the path is not a switch")]
    NotASwitch(String),
    /// The endpoints share no address family which can be matched on
    #[error("Hosts {0} and {1} have no common address to match on")]
    UnaddressedHosts(String, String),
    /// A node could not be found
    #[error("Topology Error: {0}")]
    Topology(#[from] TopologyError),
}
