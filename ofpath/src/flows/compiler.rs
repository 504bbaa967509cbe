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

//! Compilation of a path into flow rules.

use super::{Classifier, CompileError, Direction, FlowRule, PathId, RuleId, PATH_PRIORITY};
use crate::planner::Path;
use crate::topology::{NodeId, PortNo, TopologyError, TopologyGraph};

use log::*;

/// # Compile a Path
///
/// Generate the flow rules for every switch on the path. For each switch, the forward rule
/// (source to destination) is followed by the reverse rule. The forward rule matches on the port
/// facing the previous node and outputs on the port facing the next node, and the reverse rule
/// does the opposite.
///
/// The result only depends on the graph, the path and the path id, so compiling twice yields
/// identical rules in the same order. A path without any switch (two directly linked hosts) yields
/// no rules.
pub fn compile(
    graph: &TopologyGraph,
    path: &Path,
    path_id: PathId,
) -> Result<Vec<FlowRule>, CompileError> {
    let forward = classifier(graph, path.source(), path.destination())?;
    let reverse = forward.reversed();

    let mut rules = Vec::with_capacity(2 * path.switches().len());
    for hop in path.nodes().windows(3) {
        let (prev, switch, next) = (hop[0], hop[1], hop[2]);
        let node = graph.node(switch)?;
        if !node.is_switch() {
            return Err(CompileError::NotASwitch(node.name().to_string()));
        }
        let towards_prev = port(graph, switch, prev)?;
        let towards_next = port(graph, switch, next)?;

        rules.push(FlowRule {
            id: RuleId::new(path_id, node.name(), Direction::Forward),
            in_port: towards_prev,
            out_port: towards_next,
            classifier: forward,
            priority: PATH_PRIORITY,
        });
        rules.push(FlowRule {
            id: RuleId::new(path_id, node.name(), Direction::Reverse),
            in_port: towards_next,
            out_port: towards_prev,
            classifier: reverse,
            priority: PATH_PRIORITY,
        });
    }

    debug!("Compiled {} into {} rules", path_id, rules.len());
    Ok(rules)
}

/// Build the classifier of the forward direction. Ethernet addresses are preferred, since they
/// also match ARP traffic.
fn classifier(
    graph: &TopologyGraph,
    source: NodeId,
    destination: NodeId,
) -> Result<Classifier, CompileError> {
    let src = graph.node(source)?;
    let dst = graph.node(destination)?;
    match (src.mac(), dst.mac(), src.ip(), dst.ip()) {
        (Some(src), Some(dst), _, _) => Ok(Classifier::Ethernet { src, dst }),
        (_, _, Some(src), Some(dst)) => Ok(Classifier::Ipv4 { src, dst }),
        _ => Err(CompileError::UnaddressedHosts(src.name().to_string(), dst.name().to_string())),
    }
}

fn port(graph: &TopologyGraph, switch: NodeId, neighbor: NodeId) -> Result<PortNo, CompileError> {
    graph.port_to(switch, neighbor).map_err(|e| match e {
        TopologyError::NotAdjacent(switch, neighbor) => {
            error!("Interrupted path: {} has no port towards {}", switch, neighbor);
            CompileError::InterruptedPath { switch, neighbor }
        }
        e => e.into(),
    })
}
