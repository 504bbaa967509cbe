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

//! Module containing all type definitions of the topology

use petgraph::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

type IndexType = u32;
/// Node Identification (and index into the graph)
pub type NodeId = NodeIndex<IndexType>;
/// Port number local to a single node. Switch ports start at 1, host interfaces at 0.
pub type PortNo = u16;
/// Cost of a link, used by the shortest path computation
pub type LinkCost = f64;
/// Underlying undirected graph of the topology
pub type TopologyNet = Graph<Node, Link, Undirected, IndexType>;

/// First port number that is assigned on a switch
pub const FIRST_SWITCH_PORT: PortNo = 1;
/// First interface number that is assigned on a host (`h1-eth0`)
pub const FIRST_HOST_PORT: PortNo = 0;
/// Largest port number that is assigned. Numbers from `0xff00` on are reserved by OpenFlow.
pub const MAX_PORT: PortNo = 0xfeff;

/// Kind of a node in the topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// End-host with a single attachment port
    Host,
    /// OpenFlow switch, with one port per attached link
    Switch,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Switch => write!(f, "switch"),
        }
    }
}

/// Ethernet address of a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr(pub [u8; 6]);

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.trim().split(':');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(|| TopologyError::InvalidAddress(s.to_string()))?;
            if part.len() != 2 {
                return Err(TopologyError::InvalidAddress(s.to_string()));
            }
            *byte = u8::from_str_radix(part, 16)
                .map_err(|_| TopologyError::InvalidAddress(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(TopologyError::InvalidAddress(s.to_string()));
        }
        Ok(Self(bytes))
    }
}

/// Parse an IPv4 address of a host. The emulator reports addresses with their prefix length
/// (`10.0.0.1/24`), which is stripped.
pub fn parse_host_ip(s: &str) -> Result<Ipv4Addr, TopologyError> {
    let addr = s.trim().split('/').next().unwrap_or_default();
    addr.parse().map_err(|_| TopologyError::InvalidAddress(s.to_string()))
}

/// Optional attributes of a node. Addresses are only meaningful for hosts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeAttrs {
    /// IPv4 address of the host
    pub ip: Option<Ipv4Addr>,
    /// Ethernet address of the host
    pub mac: Option<MacAddr>,
}

/// # Node
/// A host or a switch in the topology. Each node remembers the next free port, such that ports are
/// assigned monotonically in the order in which links are added.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    name: String,
    kind: NodeKind,
    attrs: NodeAttrs,
    next_port: PortNo,
}

impl Node {
    pub(crate) fn new(name: String, kind: NodeKind, attrs: NodeAttrs) -> Self {
        let next_port = match kind {
            NodeKind::Host => FIRST_HOST_PORT,
            NodeKind::Switch => FIRST_SWITCH_PORT,
        };
        Self { name, kind, attrs, next_port }
    }

    /// Returns the name (the unique identifier) of the node
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the kind of the node
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Returns true if the node is a host
    pub fn is_host(&self) -> bool {
        self.kind == NodeKind::Host
    }

    /// Returns true if the node is a switch
    pub fn is_switch(&self) -> bool {
        self.kind == NodeKind::Switch
    }

    /// IPv4 address of the node, if known
    pub fn ip(&self) -> Option<Ipv4Addr> {
        self.attrs.ip
    }

    /// Ethernet address of the node, if known
    pub fn mac(&self) -> Option<MacAddr> {
        self.attrs.mac
    }

    /// Returns the port that the next link would get, without allocating it.
    pub(crate) fn free_port(&self) -> Result<PortNo, TopologyError> {
        match self.next_port {
            p if p > MAX_PORT => Err(TopologyError::PortsExhausted(self.name.clone())),
            p => Ok(p),
        }
    }

    pub(crate) fn allocate_port(&mut self) -> Result<PortNo, TopologyError> {
        let port = self.free_port()?;
        self.next_port =
            port.checked_add(1).ok_or_else(|| TopologyError::PortsExhausted(self.name.clone()))?;
        Ok(port)
    }
}

/// Shaping parameters of a link. They are passed through to the emulator, only `cost` is used
/// while planning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkAttrs {
    /// Bandwidth in Mbit/s
    pub bandwidth: Option<f64>,
    /// Delay, in the notation of the emulator (e.g. `5ms`)
    pub delay: Option<String>,
    /// Loss in percent
    pub loss: Option<f64>,
    /// Explicit cost for the shortest path computation. Links without a cost have unit cost.
    pub cost: Option<LinkCost>,
}

/// # Link
/// Undirected link between two nodes. The link stores the port on both of its endpoints, in the
/// same order as the endpoints are stored in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub(crate) attrs: LinkAttrs,
    pub(crate) ports: (PortNo, PortNo),
}

impl Link {
    /// Returns the shaping parameters of the link
    pub fn attrs(&self) -> &LinkAttrs {
        &self.attrs
    }

    /// Returns the cost of the link (1 if not configured)
    pub fn cost(&self) -> LinkCost {
        self.attrs.cost.unwrap_or(1.0)
    }
}

/// Topology Errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TopologyError {
    /// A node with the same name already exists
    #[error("Node {0} already exists")]
    DuplicateNode(String),
    /// No node with that name exists
    #[error("Node {0} does not exist")]
    UnknownNode(String),
    /// The node index is not part of the graph
    #[error("Node id {0:?} does not exist")]
    UnknownNodeId(NodeId),
    /// Both nodes are already linked
    #[error("Link {0} -- {1} already exists")]
    DuplicateLink(String, String),
    /// A link would connect a node to itself
    #[error("Cannot link {0} to itself")]
    SelfLink(String),
    /// The explicit link cost is negative or not finite
    #[error("Invalid cost on link {0} -- {1}: {2}")]
    InvalidLinkCost(String, String, LinkCost),
    /// The two nodes are not adjacent
    #[error("Nodes are not adjacent: {0} -- {1}")]
    NotAdjacent(String, String),
    /// All port numbers of the node are in use
    #[error("No free port left on {0}")]
    PortsExhausted(String),
    /// An IP or MAC address cannot be parsed
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}
