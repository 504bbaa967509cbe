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

//! Graph searches for planning a path between two hosts.

use super::{check_endpoints, reconstruct, Path, PlanError};
use crate::topology::{LinkCost, NodeId, TopologyGraph};

use log::*;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

/// Entry of the priority queue. Entries with the same cost are popped in the order in which they
/// were pushed.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    cost: LinkCost,
    seq: usize,
    node: NodeId,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cost.total_cmp(&other.cost).then(self.seq.cmp(&other.seq))
    }
}

/// Returns true if the search may continue through this node. Only the source and switches
/// forward traffic.
fn expandable(graph: &TopologyGraph, node: NodeId, source: NodeId) -> Result<bool, PlanError> {
    Ok(node == source || graph.node(node)?.is_switch())
}

fn no_path(graph: &TopologyGraph, source: NodeId, destination: NodeId) -> PlanError {
    match (graph.node_name(source), graph.node_name(destination)) {
        (Ok(s), Ok(d)) => PlanError::NoPath(s.to_string(), d.to_string()),
        (Err(e), _) | (_, Err(e)) => e.into(),
    }
}

/// # Shortest Path (Dijkstra)
///
/// Computes the path with the minimum total cost. Links without an explicit cost have cost 1.
/// A node only replaces its predecessor if a strictly cheaper path is found, so among paths of
/// equal cost, the one discovered first (visiting neighbors in ascending name order) is kept.
pub fn shortest_path(
    graph: &TopologyGraph,
    source: NodeId,
    destination: NodeId,
) -> Result<Path, PlanError> {
    check_endpoints(graph, source, destination)?;

    let mut dist: HashMap<NodeId, LinkCost> = HashMap::new();
    let mut predecessors: HashMap<NodeId, NodeId> = HashMap::new();
    let mut settled: HashSet<NodeId> = HashSet::new();
    let mut queue: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
    let mut seq: usize = 0;

    dist.insert(source, 0.0);
    queue.push(Reverse(Candidate { cost: 0.0, seq, node: source }));

    while let Some(Reverse(Candidate { cost, node, .. })) = queue.pop() {
        if !settled.insert(node) {
            continue;
        }
        if node == destination {
            break;
        }
        if !expandable(graph, node, source)? {
            continue;
        }
        for neighbor in graph.neighbors_of(node)? {
            if settled.contains(&neighbor) {
                continue;
            }
            let link_cost = graph.link(node, neighbor).map(|l| l.cost()).unwrap_or(1.0);
            let new_cost = cost + link_cost;
            if dist.get(&neighbor).map(|d| new_cost < *d).unwrap_or(true) {
                dist.insert(neighbor, new_cost);
                predecessors.insert(neighbor, node);
                seq += 1;
                queue.push(Reverse(Candidate { cost: new_cost, seq, node: neighbor }));
            }
        }
    }

    if !settled.contains(&destination) {
        return Err(no_path(graph, source, destination));
    }
    let path = reconstruct(graph, &predecessors, source, destination)?;
    debug!("Dijkstra found {} (cost {})", path.fmt_path(graph), dist[&destination]);
    Ok(path)
}

/// # Breadth-First Search
///
/// Computes a path with the minimum number of hops, ignoring link costs. Nodes are marked when
/// they are discovered, so the first discovery (in ascending name order) wins.
pub fn bfs_path(
    graph: &TopologyGraph,
    source: NodeId,
    destination: NodeId,
) -> Result<Path, PlanError> {
    check_endpoints(graph, source, destination)?;

    let mut predecessors: HashMap<NodeId, NodeId> = HashMap::new();
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut queue: VecDeque<NodeId> = VecDeque::new();

    visited.insert(source);
    queue.push_back(source);

    'search: while let Some(node) = queue.pop_front() {
        if !expandable(graph, node, source)? {
            continue;
        }
        for neighbor in graph.neighbors_of(node)? {
            if visited.insert(neighbor) {
                predecessors.insert(neighbor, node);
                if neighbor == destination {
                    break 'search;
                }
                queue.push_back(neighbor);
            }
        }
    }

    if !visited.contains(&destination) {
        return Err(no_path(graph, source, destination));
    }
    let path = reconstruct(graph, &predecessors, source, destination)?;
    debug!("BFS found {}", path.fmt_path(graph));
    Ok(path)
}

/// # Depth-First Search
///
/// Returns the first path found by a depth-first traversal, descending into the neighbors in
/// ascending name order. This is the naive baseline: the result is not necessarily the shortest
/// path.
pub fn dfs_path(
    graph: &TopologyGraph,
    source: NodeId,
    destination: NodeId,
) -> Result<Path, PlanError> {
    check_endpoints(graph, source, destination)?;

    let mut predecessors: HashMap<NodeId, NodeId> = HashMap::new();
    let mut visited: HashSet<NodeId> = HashSet::new();
    // stack of (node, predecessor). Neighbors are pushed in reverse order, such that the smallest
    // one is explored first.
    let mut stack: Vec<(NodeId, Option<NodeId>)> = vec![(source, None)];

    while let Some((node, predecessor)) = stack.pop() {
        if !visited.insert(node) {
            continue;
        }
        if let Some(p) = predecessor {
            predecessors.insert(node, p);
        }
        if node == destination {
            let path = reconstruct(graph, &predecessors, source, destination)?;
            debug!("DFS found {}", path.fmt_path(graph));
            return Ok(path);
        }
        if !expandable(graph, node, source)? {
            continue;
        }
        for neighbor in graph.neighbors_of(node)?.into_iter().rev() {
            if !visited.contains(&neighbor) {
                stack.push((neighbor, Some(node)));
            }
        }
    }

    Err(no_path(graph, source, destination))
}
