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

//! # Path Planner
//!
//! Computes a path from a source host to a destination host. The path is either supplied by the
//! operator ([`manual_path`]) or searched in the graph ([`shortest_path`], [`bfs_path`] and
//! [`dfs_path`]). Every planner is a pure function of the graph and the two endpoints.
//!
//! All searches visit the neighbors of a node in ascending name order, and they never expand a
//! host other than the source, since a path must not pass through a host.

mod manual;
mod search;

pub use manual::manual_path;
pub use search::{bfs_path, dfs_path, shortest_path};

use crate::topology::{NodeId, NodeKind, TopologyError, TopologyGraph};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// # Path
/// Ordered sequence of distinct nodes, starting at the source host and ending at the destination
/// host, with only switches in between.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path(Vec<NodeId>);

impl Path {
    /// Returns all nodes of the path
    pub fn nodes(&self) -> &[NodeId] {
        &self.0
    }

    /// Returns the source host
    pub fn source(&self) -> NodeId {
        self.0[0]
    }

    /// Returns the destination host
    pub fn destination(&self) -> NodeId {
        self.0[self.0.len() - 1]
    }

    /// Returns the number of nodes on the path
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// A path always contains at least two nodes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the interior nodes, which are all switches
    pub fn switches(&self) -> &[NodeId] {
        &self.0[1..self.0.len() - 1]
    }

    /// Returns the names of all nodes on the path
    pub fn names(&self, graph: &TopologyGraph) -> Result<Vec<String>, TopologyError> {
        self.0.iter().map(|n| graph.node_name(*n).map(String::from)).collect()
    }

    /// Returns a formatted string of the path, like `h1 -> s1 -> h2`
    pub fn fmt_path(&self, graph: &TopologyGraph) -> String {
        self.0
            .iter()
            .map(|n| graph.node_name(*n).map(String::from).unwrap_or_else(|_| format!("{:?}", n)))
            .join(" -> ")
    }
}

/// Algorithm to use when planning a path. The manual variant carries the sequence chosen by the
/// operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Algorithm {
    /// Use the sequence as it is, after validating it
    Manual(Vec<NodeId>),
    /// Minimum cost path (see [`shortest_path`])
    Dijkstra,
    /// Minimum hop count path (see [`bfs_path`])
    Bfs,
    /// First path found by a depth-first search (see [`dfs_path`])
    Dfs,
}

impl Algorithm {
    /// Plan the path from `source` to `destination`
    pub fn plan(
        &self,
        graph: &TopologyGraph,
        source: NodeId,
        destination: NodeId,
    ) -> Result<Path, PlanError> {
        match self {
            Self::Manual(sequence) => manual_path(graph, source, destination, sequence),
            Self::Dijkstra => shortest_path(graph, source, destination),
            Self::Bfs => bfs_path(graph, source, destination),
            Self::Dfs => dfs_path(graph, source, destination),
        }
    }

    /// Returns the kind of the algorithm, without the manual sequence
    pub fn kind(&self) -> AlgorithmKind {
        match self {
            Self::Manual(_) => AlgorithmKind::Manual,
            Self::Dijkstra => AlgorithmKind::Dijkstra,
            Self::Bfs => AlgorithmKind::Bfs,
            Self::Dfs => AlgorithmKind::Dfs,
        }
    }
}

/// Name of the algorithm, as it appears in path requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmKind {
    /// Manual selection
    Manual,
    /// Dijkstra
    Dijkstra,
    /// Breadth-first search
    Bfs,
    /// Depth-first search
    Dfs,
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Dijkstra => write!(f, "dijkstra"),
            Self::Bfs => write!(f, "bfs"),
            Self::Dfs => write!(f, "dfs"),
        }
    }
}

impl FromStr for AlgorithmKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "dijkstra" => Ok(Self::Dijkstra),
            "bfs" => Ok(Self::Bfs),
            "dfs" => Ok(Self::Dfs),
            _ => Err(format!("unknown algorithm: {}", s)),
        }
    }
}

/// # Path Request
/// Request of a path between two hosts, referencing the nodes by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathRequest {
    /// Name of the source host
    pub source: String,
    /// Name of the destination host
    pub destination: String,
    /// Algorithm used to plan the path
    pub algorithm: AlgorithmKind,
    /// Node sequence, required for the manual algorithm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_sequence: Option<Vec<String>>,
}

impl PathRequest {
    /// Resolve all names in the request. Returns the source, the destination and the algorithm.
    pub fn resolve(&self, graph: &TopologyGraph) -> Result<(NodeId, NodeId, Algorithm), PlanError> {
        let source = graph.node_id(&self.source)?;
        let destination = graph.node_id(&self.destination)?;
        let algorithm = match (self.algorithm, self.manual_sequence.as_ref()) {
            (AlgorithmKind::Manual, Some(seq)) => Algorithm::Manual(
                seq.iter()
                    .map(|n| {
                        graph.node_id(n).map_err(|_| {
                            PlanError::InvalidPath(PathViolation::UnknownNode(n.clone()))
                        })
                    })
                    .collect::<Result<_, _>>()?,
            ),
            (AlgorithmKind::Manual, None) => {
                return Err(PlanError::InvalidPath(PathViolation::MissingSequence))
            }
            (AlgorithmKind::Dijkstra, _) => Algorithm::Dijkstra,
            (AlgorithmKind::Bfs, _) => Algorithm::Bfs,
            (AlgorithmKind::Dfs, _) => Algorithm::Dfs,
        };
        Ok((source, destination, algorithm))
    }
}

/// Invariant of a path that was violated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathViolation {
    /// The manual algorithm was requested without a sequence
    MissingSequence,
    /// The path has fewer than two nodes
    TooShort(usize),
    /// Source and destination are the same host
    SameEndpoints(String),
    /// An endpoint is not a host
    EndpointNotAHost(String),
    /// The sequence references a node which does not exist
    UnknownNode(String),
    /// The first node of the sequence is not the requested source
    SourceMismatch {
        /// requested source
        expected: String,
        /// first node of the sequence
        found: String,
    },
    /// The last node of the sequence is not the requested destination
    DestinationMismatch {
        /// requested destination
        expected: String,
        /// last node of the sequence
        found: String,
    },
    /// A node appears more than once
    RepeatedNode(String),
    /// A host appears in the interior of the path
    HostInInterior(String),
    /// Two consecutive nodes are not linked
    NotAdjacent(String, String),
}

impl fmt::Display for PathViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSequence => write!(f, "manual path requested without a node sequence"),
            Self::TooShort(len) => write!(f, "path has {} nodes, at least 2 are required", len),
            Self::SameEndpoints(h) => write!(f, "source and destination are both {}", h),
            Self::EndpointNotAHost(n) => write!(f, "endpoint {} is not a host", n),
            Self::UnknownNode(n) => write!(f, "node {} does not exist", n),
            Self::SourceMismatch { expected, found } => {
                write!(f, "path starts at {}, but the source is {}", found, expected)
            }
            Self::DestinationMismatch { expected, found } => {
                write!(f, "path ends at {}, but the destination is {}", found, expected)
            }
            Self::RepeatedNode(n) => write!(f, "node {} appears more than once", n),
            Self::HostInInterior(n) => write!(f, "host {} cannot forward traffic", n),
            Self::NotAdjacent(a, b) => write!(f, "no link between {} and {}", a, b),
        }
    }
}

/// Planning Errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    /// The path (or the request) violates an invariant
    #[error("Invalid path: {0}")]
    InvalidPath(PathViolation),
    /// Source and destination are not connected
    #[error("No path from {0} to {1}")]
    NoPath(String, String),
    /// A node could not be found
    #[error("Topology Error: {0}")]
    Topology(#[from] TopologyError),
}

/// Check that both endpoints exist, are hosts, and are different.
pub(crate) fn check_endpoints(
    graph: &TopologyGraph,
    source: NodeId,
    destination: NodeId,
) -> Result<(), PlanError> {
    for endpoint in [source, destination].iter() {
        let node = graph.node(*endpoint)?;
        if node.kind() != NodeKind::Host {
            return Err(PlanError::InvalidPath(PathViolation::EndpointNotAHost(
                node.name().to_string(),
            )));
        }
    }
    if source == destination {
        return Err(PlanError::InvalidPath(PathViolation::SameEndpoints(
            graph.node_name(source)?.to_string(),
        )));
    }
    Ok(())
}

/// Follow the predecessors back from the destination to the source.
pub(crate) fn reconstruct(
    graph: &TopologyGraph,
    predecessors: &HashMap<NodeId, NodeId>,
    source: NodeId,
    destination: NodeId,
) -> Result<Path, PlanError> {
    let mut nodes = vec![destination];
    let mut current = destination;
    while current != source {
        current = match predecessors.get(&current) {
            Some(p) => *p,
            None => {
                return Err(PlanError::NoPath(
                    graph.node_name(source)?.to_string(),
                    graph.node_name(destination)?.to_string(),
                ))
            }
        };
        nodes.push(current);
    }
    nodes.reverse();
    Ok(Path(nodes))
}

/// Create a path without checking any invariant.
#[cfg(test)]
pub(crate) fn unchecked_path(nodes: Vec<NodeId>) -> Path {
    Path(nodes)
}
