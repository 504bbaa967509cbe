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

#![deny(missing_docs)]

//! # ofpath: Planning Paths and Compiling them into OpenFlow Rules
//! This is a library for computing a path between two hosts of a small software-defined network,
//! and pushing that path into the data plane as OpenFlow forwarding rules. The counters of the
//! switch ports at both ends of the path can be read back to verify that traffic flows.
//!
//! ## Structure
//!
//! The library is structured in the following way, from the leaves to the root:
//!
//! - **[`Topology`](topology)**: Graph of hosts, switches and links, storing the port that every
//!   link occupies on its endpoints. See [`TopologyGraph`](topology::TopologyGraph). The graph can
//!   be built from a [`TopologyDescription`](topology::TopologyDescription) in JSON.
//!
//! - **[`Planner`](planner)**: Computes the [`Path`](planner::Path) between two hosts, either by
//!   validating a sequence chosen by the operator, or by searching the graph (Dijkstra, BFS and
//!   DFS). All searches break ties by visiting neighbors in ascending name order.
//!
//! - **[`Flows`](flows)**: Compiles a path into two [`FlowRules`](flows::FlowRule) per switch,
//!   one for each direction.
//!
//! - **[`Control`](control)**: The [`ControlPlane`](control::ControlPlane) trait, which installs
//!   and removes rules and reads counters, together with batch operations that roll back on
//!   failure. The [`MemoryDataPlane`](control::MemoryDataPlane) implements it in memory.
//!
//! - **[`Session`](session)**: The [`SessionManager`](session::SessionManager) coordinates all of
//!   the above, and tracks the active path of every host pair.
//!
//! ## Usage
//!
//! ```
//! use ofpath::control::MemoryDataPlane;
//! use ofpath::planner::Algorithm;
//! use ofpath::session::SessionManager;
//! use ofpath::topology::TopologyDescription;
//! use ofpath::Error;
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Error> {
//!     let description = TopologyDescription::from_json(r#"{
//!         "nodes": [
//!             { "id": "h1", "kind": "host", "ip": "10.0.0.1/8", "mac": "00:00:00:00:00:01" },
//!             { "id": "h2", "kind": "host", "ip": "10.0.0.2/8", "mac": "00:00:00:00:00:02" },
//!             { "id": "s1", "kind": "switch" },
//!             { "id": "s2", "kind": "switch" }
//!         ],
//!         "links": [
//!             { "a": "h1", "b": "s1" }, { "a": "s1", "b": "s2" }, { "a": "s2", "b": "h2" }
//!         ]
//!     }"#)?;
//!     let graph = description.build()?;
//!     let h1 = graph.node_id("h1")?;
//!     let h2 = graph.node_id("h2")?;
//!
//!     let plane = Arc::new(MemoryDataPlane::for_topology(&graph));
//!     let mut manager = SessionManager::new(plane.clone());
//!     let id = manager.create_path(&graph, h1, h2, &Algorithm::Dijkstra)?.id;
//!     assert_eq!(plane.num_installed(), 4);
//!
//!     // read the counters of the ports facing h1 and h2
//!     let stats = manager.stats_for(id)?;
//!     println!("{:?}", stats);
//!
//!     manager.teardown_all()?;
//!     Ok(())
//! }
//! ```

pub mod control;
mod error;
pub mod flows;
pub mod planner;
pub mod session;
pub mod topology;

mod test;

pub use error::Error;
