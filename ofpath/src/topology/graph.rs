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

//! # Topology Graph
//!
//! Nodes and links are stored in a single petgraph arena and referenced by their [`NodeId`]. The
//! port on each side of a link is stored on the edge itself, so the port mapping of a switch is
//! derived from its incident edges and is symmetric by construction.

use crate::topology::types::*;

use log::*;
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;

/// # Topology Graph
///
/// The graph is built once before an experiment starts. It offers no removal operations, since
/// the port assignment is baked into the running switches.
///
/// ```rust
/// use ofpath::topology::{TopologyGraph, LinkAttrs};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut g = TopologyGraph::new();
/// let h1 = g.add_host("h1", None, None)?;
/// let s1 = g.add_switch("s1")?;
/// let s2 = g.add_switch("s2")?;
/// g.add_link(h1, s1, LinkAttrs::default())?;
/// g.add_link(s1, s2, LinkAttrs::default())?;
///
/// assert_eq!(g.port_to(s1, h1)?, 1);
/// assert_eq!(g.port_to(s1, s2)?, 2);
/// assert_eq!(g.port_to(s2, s1)?, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct TopologyGraph {
    net: TopologyNet,
    names: HashMap<String, NodeId>,
}

impl TopologyGraph {
    /// Generate an empty topology
    pub fn new() -> Self {
        Self { net: TopologyNet::default(), names: HashMap::new() }
    }

    /// Add a new node. Fails with [`TopologyError::DuplicateNode`] if the name is already used.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        kind: NodeKind,
        attrs: NodeAttrs,
    ) -> Result<NodeId, TopologyError> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(TopologyError::DuplicateNode(name));
        }
        if kind == NodeKind::Switch && attrs != NodeAttrs::default() {
            debug!("Ignoring addresses of switch {}", name);
        }
        let id = self.net.add_node(Node::new(name.clone(), kind, attrs));
        debug!("Add {} {} as {:?}", kind, name, id);
        self.names.insert(name, id);
        Ok(id)
    }

    /// Add a new host with optional addresses.
    pub fn add_host(
        &mut self,
        name: impl Into<String>,
        ip: Option<Ipv4Addr>,
        mac: Option<MacAddr>,
    ) -> Result<NodeId, TopologyError> {
        self.add_node(name, NodeKind::Host, NodeAttrs { ip, mac })
    }

    /// Add a new switch.
    pub fn add_switch(&mut self, name: impl Into<String>) -> Result<NodeId, TopologyError> {
        self.add_node(name, NodeKind::Switch, NodeAttrs::default())
    }

    /// Add a link between `a` and `b`, and allocate the next free port on both of them. Returns
    /// the ports on `a` and on `b`, or [`TopologyError::PortsExhausted`] if one of them has no
    /// port number left (see [`MAX_PORT`]).
    pub fn add_link(
        &mut self,
        a: NodeId,
        b: NodeId,
        attrs: LinkAttrs,
    ) -> Result<(PortNo, PortNo), TopologyError> {
        let name_a = self.node_name(a)?.to_string();
        let name_b = self.node_name(b)?.to_string();
        if a == b {
            return Err(TopologyError::SelfLink(name_a));
        }
        if self.net.contains_edge(a, b) {
            return Err(TopologyError::DuplicateLink(name_a, name_b));
        }
        if let Some(cost) = attrs.cost {
            if !cost.is_finite() || cost < 0.0 {
                return Err(TopologyError::InvalidLinkCost(name_a, name_b, cost));
            }
        }

        // check both sides first, such that a failing link allocates no port
        self.node(a)?.free_port()?;
        self.node(b)?.free_port()?;
        let port_a = self.node_mut(a)?.allocate_port()?;
        let port_b = self.node_mut(b)?.allocate_port()?;
        self.net.add_edge(a, b, Link { attrs, ports: (port_a, port_b) });
        debug!("Add link {}:{} -- {}:{}", name_a, port_a, name_b, port_b);
        Ok((port_a, port_b))
    }

    /// Add a link, referencing both endpoints by name.
    pub fn add_link_by_name(
        &mut self,
        a: &str,
        b: &str,
        attrs: LinkAttrs,
    ) -> Result<(PortNo, PortNo), TopologyError> {
        let a = self.node_id(a)?;
        let b = self.node_id(b)?;
        self.add_link(a, b, attrs)
    }

    /// Returns all neighbors of a node, sorted by ascending name. All planners rely on this order
    /// to produce reproducible paths.
    pub fn neighbors_of(&self, id: NodeId) -> Result<Vec<NodeId>, TopologyError> {
        self.node(id)?;
        let mut neighbors: Vec<NodeId> = self.net.neighbors(id).collect();
        neighbors.sort_by(|x, y| self.net[*x].name().cmp(self.net[*y].name()));
        Ok(neighbors)
    }

    /// Returns the local port on `node` which faces `neighbor`.
    pub fn port_to(&self, node: NodeId, neighbor: NodeId) -> Result<PortNo, TopologyError> {
        let missing = || self.not_adjacent(node, neighbor);
        let edge = self.net.find_edge(node, neighbor).ok_or_else(missing)?;
        let (first, _) = self.net.edge_endpoints(edge).ok_or_else(missing)?;
        let ports = self.net[edge].ports;
        Ok(if first == node { ports.0 } else { ports.1 })
    }

    /// Returns the link between `a` and `b`, if it exists.
    pub fn link(&self, a: NodeId, b: NodeId) -> Option<&Link> {
        self.net.find_edge(a, b).map(|e| &self.net[e])
    }

    /// Returns true if `a` and `b` are connected by a link
    pub fn is_adjacent(&self, a: NodeId, b: NodeId) -> bool {
        self.net.find_edge(a, b).is_some()
    }

    /// Returns all links as `(a, b, link)`, in the order in which they were added.
    pub fn links(&self) -> impl Iterator<Item = (NodeId, NodeId, &Link)> + '_ {
        self.net.edge_indices().filter_map(move |e| {
            self.net.edge_endpoints(e).map(|(a, b)| (a, b, &self.net[e]))
        })
    }

    /// Returns the port mapping of a node: neighbor name to local port.
    pub fn port_map(&self, id: NodeId) -> Result<BTreeMap<String, PortNo>, TopologyError> {
        self.neighbors_of(id)?
            .into_iter()
            .map(|n| Ok((self.net[n].name().to_string(), self.port_to(id, n)?)))
            .collect()
    }

    /// Returns the node with the given id
    pub fn node(&self, id: NodeId) -> Result<&Node, TopologyError> {
        self.net.node_weight(id).ok_or(TopologyError::UnknownNodeId(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, TopologyError> {
        self.net.node_weight_mut(id).ok_or(TopologyError::UnknownNodeId(id))
    }

    /// Returns the id of the node with the given name
    pub fn node_id(&self, name: impl AsRef<str>) -> Result<NodeId, TopologyError> {
        self.names
            .get(name.as_ref())
            .copied()
            .ok_or_else(|| TopologyError::UnknownNode(name.as_ref().to_string()))
    }

    /// Returns the name of the node with the given id
    pub fn node_name(&self, id: NodeId) -> Result<&str, TopologyError> {
        Ok(self.node(id)?.name())
    }

    /// Returns all node ids, in the order in which they were added.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.net.node_indices()
    }

    /// Returns all hosts
    pub fn hosts(&self) -> Vec<NodeId> {
        self.net.node_indices().filter(|n| self.net[*n].is_host()).collect()
    }

    /// Returns all switches
    pub fn switches(&self) -> Vec<NodeId> {
        self.net.node_indices().filter(|n| self.net[*n].is_switch()).collect()
    }

    /// Returns the number of nodes
    pub fn num_nodes(&self) -> usize {
        self.net.node_count()
    }

    /// Returns the number of links
    pub fn num_links(&self) -> usize {
        self.net.edge_count()
    }

    fn not_adjacent(&self, a: NodeId, b: NodeId) -> TopologyError {
        let name = |n: NodeId| {
            self.net
                .node_weight(n)
                .map(|n| n.name().to_string())
                .unwrap_or_else(|| format!("{:?}", n))
        };
        TopologyError::NotAdjacent(name(a), name(b))
    }
}
