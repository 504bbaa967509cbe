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

//! Validation of paths chosen by the operator.

use super::{check_endpoints, Path, PathViolation, PlanError};
use crate::topology::{NodeId, TopologyGraph};

use itertools::Itertools;
use log::*;
use std::collections::HashSet;

/// # Manual Path
///
/// Validate the sequence chosen by the operator, and return it as a [`Path`]. The checks are
/// done in the following order, and the first violation is returned as
/// [`PlanError::InvalidPath`]:
///
/// 1. Both endpoints are distinct hosts.
/// 2. The sequence has at least two nodes, which all exist.
/// 3. The sequence starts at the source and ends at the destination.
/// 4. Walking along the sequence, every node appears only once, every interior node is a switch,
///    and every node is linked to its predecessor.
pub fn manual_path(
    graph: &TopologyGraph,
    source: NodeId,
    destination: NodeId,
    sequence: &[NodeId],
) -> Result<Path, PlanError> {
    check_endpoints(graph, source, destination)?;

    if sequence.len() < 2 {
        return Err(PlanError::InvalidPath(PathViolation::TooShort(sequence.len())));
    }

    let names = sequence
        .iter()
        .map(|n| {
            graph
                .node_name(*n)
                .map(String::from)
                .map_err(|_| PlanError::InvalidPath(PathViolation::UnknownNode(format!("{:?}", n))))
        })
        .collect::<Result<Vec<String>, PlanError>>()?;

    let first = sequence[0];
    let last = sequence[sequence.len() - 1];
    if first != source {
        return Err(PlanError::InvalidPath(PathViolation::SourceMismatch {
            expected: graph.node_name(source)?.to_string(),
            found: names[0].clone(),
        }));
    }
    if last != destination {
        return Err(PlanError::InvalidPath(PathViolation::DestinationMismatch {
            expected: graph.node_name(destination)?.to_string(),
            found: names[names.len() - 1].clone(),
        }));
    }

    let mut seen: HashSet<NodeId> = HashSet::new();
    seen.insert(first);
    for (i, (a, b)) in sequence.iter().tuple_windows().enumerate() {
        let name_b = &names[i + 1];
        if !seen.insert(*b) {
            return Err(PlanError::InvalidPath(PathViolation::RepeatedNode(name_b.clone())));
        }
        if i + 2 < sequence.len() && graph.node(*b)?.is_host() {
            return Err(PlanError::InvalidPath(PathViolation::HostInInterior(name_b.clone())));
        }
        if !graph.is_adjacent(*a, *b) {
            return Err(PlanError::InvalidPath(PathViolation::NotAdjacent(
                names[i].clone(),
                name_b.clone(),
            )));
        }
    }

    let path = Path(sequence.to_vec());
    debug!("Manual path accepted: {}", path.fmt_path(graph));
    Ok(path)
}
