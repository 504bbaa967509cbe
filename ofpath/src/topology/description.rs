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

//! Topology description, as it is exchanged with the editor and the emulator.

use crate::topology::graph::TopologyGraph;
use crate::topology::types::*;
use crate::Error;

use log::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// # Topology Description
///
/// Minimal node and link schema from which the [`TopologyGraph`] is built. Nodes are added first,
/// then links, both in the listed order, which makes the port numbers reproducible from the file.
///
/// ```json
/// {
///   "nodes": [
///     { "id": "h1", "kind": "host", "ip": "10.0.0.1/24", "mac": "00:00:00:00:00:01" },
///     { "id": "s1", "kind": "switch" }
///   ],
///   "links": [ { "a": "h1", "b": "s1", "bandwidth": 10.0, "delay": "5ms" } ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TopologyDescription {
    /// All nodes
    pub nodes: Vec<NodeRecord>,
    /// All links
    #[serde(default)]
    pub links: Vec<LinkRecord>,
}

/// Node record of the description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Unique name of the node
    pub id: String,
    /// Host or switch
    pub kind: NodeKind,
    /// IPv4 address (hosts only), optionally with prefix length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// Ethernet address (hosts only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    /// Port mapping (neighbor to local port). Only written by [`TopologyGraph::describe`], it is
    /// ignored while building, since ports are allocated in link order.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ports: BTreeMap<String, PortNo>,
}

/// Link record of the description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// First endpoint
    pub a: String,
    /// Second endpoint
    pub b: String,
    /// Bandwidth in Mbit/s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<f64>,
    /// Delay (e.g. `5ms`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<String>,
    /// Loss in percent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss: Option<f64>,
    /// Explicit cost for the shortest path computation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<LinkCost>,
}

impl TopologyDescription {
    /// Parse the description from a JSON string
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse the description from a JSON file
    pub fn from_file(filename: impl AsRef<Path>) -> Result<Self, Error> {
        Self::from_json(&std::fs::read_to_string(filename)?)
    }

    /// Serialize the description as pretty printed JSON
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Build the topology graph
    pub fn build(&self) -> Result<TopologyGraph, TopologyError> {
        let mut g = TopologyGraph::new();
        for node in self.nodes.iter() {
            let attrs = NodeAttrs {
                ip: node.ip.as_deref().map(parse_host_ip).transpose()?,
                mac: node.mac.as_deref().map(str::parse).transpose()?,
            };
            g.add_node(node.id.clone(), node.kind, attrs)?;
        }
        for link in self.links.iter() {
            let attrs = LinkAttrs {
                bandwidth: link.bandwidth,
                delay: link.delay.clone(),
                loss: link.loss,
                cost: link.cost,
            };
            g.add_link_by_name(&link.a, &link.b, attrs)?;
        }
        info!("Built topology with {} nodes and {} links", g.num_nodes(), g.num_links());
        Ok(g)
    }
}

impl TopologyGraph {
    /// Generate the description of the graph, including the port mapping of every node.
    pub fn describe(&self) -> TopologyDescription {
        let nodes = self
            .nodes()
            .filter_map(|id| {
                let node = self.node(id).ok()?;
                Some(NodeRecord {
                    id: node.name().to_string(),
                    kind: node.kind(),
                    ip: node.ip().map(|ip| ip.to_string()),
                    mac: node.mac().map(|mac| mac.to_string()),
                    ports: self.port_map(id).unwrap_or_default(),
                })
            })
            .collect();
        let links = self
            .links()
            .filter_map(|(a, b, link)| {
                Some(LinkRecord {
                    a: self.node_name(a).ok()?.to_string(),
                    b: self.node_name(b).ok()?.to_string(),
                    bandwidth: link.attrs().bandwidth,
                    delay: link.attrs().delay.clone(),
                    loss: link.attrs().loss,
                    cost: link.attrs().cost,
                })
            })
            .collect();
        TopologyDescription { nodes, links }
    }
}
