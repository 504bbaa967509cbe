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

//! # Path Session Manager
//!
//! The [`SessionManager`] owns the active paths. It plans a requested path, compiles it, installs
//! its rules on the data plane, and tracks it until it is torn down. Each pair of hosts has at
//! most one active path, and follows the state machine of [`PairState`].
//!
//! The manager is the single owner of the active paths, hence every mutating operation takes
//! `&mut self`. Two handles can be given to other threads: the [`CancelHandle`] to request the
//! teardown of a pair while its path is being installed, and the [`CounterReader`] to read the
//! counters of active paths without waiting on the manager.

mod state;

pub use state::{PairEvent, PairState};

use crate::control::{
    install_all, remove_all, BatchOptions, ControlError, ControlPlane, CounterSnapshot, FlowStats,
};
use crate::flows::{compile, CompileError, FlowRule, PathId, RuleId};
use crate::planner::{Algorithm, AlgorithmKind, Path, PathRequest, PlanError};
use crate::topology::{NodeId, PortNo, TopologyError, TopologyGraph};

use log::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use thiserror::Error;

/// Unordered pair of hosts. The rules of a path forward traffic in both directions, hence the
/// path from `a` to `b` also serves `b` to `a`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostPair(NodeId, NodeId);

impl HostPair {
    /// Create the pair, independent of the order of the hosts
    pub fn new(a: NodeId, b: NodeId) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    /// Returns both hosts, the one with the smaller id first
    pub fn hosts(&self) -> (NodeId, NodeId) {
        (self.0, self.1)
    }
}

/// Options of the session manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Timeout of a whole install or remove batch
    pub batch_timeout: Duration,
    /// Number of rules that are installed or removed at the same time
    pub parallelism: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        let batch = BatchOptions::default();
        Self { batch_timeout: batch.timeout, parallelism: batch.parallelism }
    }
}

impl SessionOptions {
    fn batch(&self) -> BatchOptions {
        BatchOptions { timeout: self.batch_timeout, parallelism: self.parallelism }
    }
}

/// Switch port on which the traffic of a path enters or leaves the network
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SwitchPort {
    /// Switch name
    pub switch: String,
    /// Port facing the host
    pub port: PortNo,
}

/// Switch ports facing the source and the destination host. Paths without a switch have none.
type Endpoints = Option<(SwitchPort, SwitchPort)>;

/// # Active Path
/// A path whose rules are installed.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivePath {
    /// Identifier of the path
    pub id: PathId,
    /// Host pair served by the path
    pub pair: HostPair,
    /// The planned path
    pub path: Path,
    /// Names of the nodes on the path
    pub names: Vec<String>,
    /// Installed rules
    pub rules: Vec<FlowRule>,
    /// Algorithm which planned the path
    pub algorithm: AlgorithmKind,
}

impl ActivePath {
    /// Identifiers of all installed rules
    pub fn rule_ids(&self) -> Vec<RuleId> {
        self.rules.iter().map(|r| r.id.clone()).collect()
    }

    /// Summary of the path, as it is reported to the operator
    pub fn summary(&self) -> PathSummary {
        PathSummary {
            path_id: self.id,
            sequence: self.names.clone(),
            installed_rule_ids: self.rules.iter().map(|r| r.id.to_string()).collect(),
            algorithm: self.algorithm,
        }
    }
}

/// Summary of an active path
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathSummary {
    /// Identifier of the path
    pub path_id: PathId,
    /// Node names, from source to destination
    pub sequence: Vec<String>,
    /// Identifiers of the installed rules
    pub installed_rule_ids: Vec<String>,
    /// Algorithm which planned the path
    pub algorithm: AlgorithmKind,
}

/// Result of reading the counters of one endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CounterReading {
    /// The counters were read
    Available(CounterSnapshot),
    /// The counters could not be read. This is not an error of the path.
    Unavailable {
        /// why the counters could not be read
        reason: String,
    },
}

impl CounterReading {
    /// Returns the snapshot, if available
    pub fn snapshot(&self) -> Option<&CounterSnapshot> {
        match self {
            Self::Available(s) => Some(s),
            Self::Unavailable { .. } => None,
        }
    }
}

/// Counters of the switch ports facing the two endpoint hosts of a path
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathStats {
    /// Identifier of the path
    pub path_id: PathId,
    /// Port facing the source host
    pub source: CounterReading,
    /// Port facing the destination host
    pub destination: CounterReading,
}

/// # Cancel Handle
///
/// Thread safe handle to request the teardown of a host pair whose path is currently being
/// installed. The installation finishes its batch, and then removes the rules again.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    in_flight: Arc<Mutex<HashMap<HostPair, bool>>>,
}

impl CancelHandle {
    /// Request the teardown of the pair. Returns `true` if an installation was in flight and will
    /// be cancelled, and `false` if nothing is being installed for the pair (in which case the
    /// caller should use [`SessionManager::teardown_path`]).
    pub fn request_teardown(&self, a: NodeId, b: NodeId) -> bool {
        match self.lock().get_mut(&HostPair::new(a, b)) {
            Some(flag) => {
                *flag = true;
                true
            }
            None => false,
        }
    }

    fn begin(&self, pair: HostPair) {
        self.lock().insert(pair, false);
    }

    /// Returns true if a teardown was requested in the meantime
    fn finish(&self, pair: HostPair) -> bool {
        self.lock().remove(&pair).unwrap_or(false)
    }

    /// The map stays consistent even if a thread panicked while holding the lock.
    fn lock(&self) -> MutexGuard<'_, HashMap<HostPair, bool>> {
        match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// # Counter Reader
///
/// Thread safe handle to read the endpoint counters of active paths. It only shares the map of
/// endpoints with the manager, which is locked for the time of a lookup, so reading counters never
/// waits for an installation to finish.
pub struct CounterReader<C: ControlPlane> {
    plane: Arc<C>,
    endpoints: Arc<RwLock<HashMap<PathId, Endpoints>>>,
}

impl<C: ControlPlane> Clone for CounterReader<C> {
    fn clone(&self) -> Self {
        Self { plane: self.plane.clone(), endpoints: self.endpoints.clone() }
    }
}

impl<C: ControlPlane> CounterReader<C> {
    /// Read the counters of the switch ports facing both endpoints of the path. A counter that
    /// cannot be read is reported as [`CounterReading::Unavailable`]. Fails only if the path is not
    /// active.
    pub fn stats_for(&self, id: PathId) -> Result<PathStats, SessionError> {
        let endpoints = match self.endpoints.read() {
            Ok(map) => map.get(&id).cloned(),
            Err(poisoned) => poisoned.into_inner().get(&id).cloned(),
        }
        .ok_or(SessionError::UnknownPath(id))?;

        let (source, destination) = match endpoints {
            Some((src, dst)) => (self.read(&src), self.read(&dst)),
            None => {
                let reason = "the path contains no switch".to_string();
                (
                    CounterReading::Unavailable { reason: reason.clone() },
                    CounterReading::Unavailable { reason },
                )
            }
        };
        Ok(PathStats { path_id: id, source, destination })
    }

    fn read(&self, endpoint: &SwitchPort) -> CounterReading {
        match self.plane.read_counters(&endpoint.switch, endpoint.port) {
            Ok(counters) => CounterReading::Available(CounterSnapshot::now(
                endpoint.switch.clone(),
                endpoint.port,
                counters,
            )),
            Err(e) => {
                debug!("{}", e);
                CounterReading::Unavailable { reason: e.to_string() }
            }
        }
    }
}

/// # Session Manager
///
/// ```rust
/// use ofpath::control::MemoryDataPlane;
/// use ofpath::planner::Algorithm;
/// use ofpath::session::{PairState, SessionManager};
/// use ofpath::topology::{LinkAttrs, TopologyGraph};
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut g = TopologyGraph::new();
/// let h1 = g.add_host("h1", Some("10.0.0.1".parse()?), None)?;
/// let h2 = g.add_host("h2", Some("10.0.0.2".parse()?), None)?;
/// let s1 = g.add_switch("s1")?;
/// g.add_link(h1, s1, LinkAttrs::default())?;
/// g.add_link(s1, h2, LinkAttrs::default())?;
///
/// let plane = Arc::new(MemoryDataPlane::for_topology(&g));
/// let mut manager = SessionManager::new(plane.clone());
/// let id = manager.create_path(&g, h1, h2, &Algorithm::Bfs)?.id;
/// assert_eq!(plane.num_installed(), 2);
/// assert_eq!(manager.state(h2, h1), PairState::Active { path: id });
///
/// manager.teardown_path(id)?;
/// assert_eq!(plane.num_installed(), 0);
/// # Ok(())
/// # }
/// ```
pub struct SessionManager<C: ControlPlane + 'static> {
    plane: Arc<C>,
    options: SessionOptions,
    next_id: u32,
    pairs: HashMap<HostPair, PairState>,
    active: BTreeMap<PathId, ActivePath>,
    endpoints: Arc<RwLock<HashMap<PathId, Endpoints>>>,
    strays: Vec<RuleId>,
    cancel: CancelHandle,
}

impl<C: ControlPlane + 'static> SessionManager<C> {
    /// Create a manager with default options
    pub fn new(plane: Arc<C>) -> Self {
        Self::with_options(plane, SessionOptions::default())
    }

    /// Create a manager with the given options
    pub fn with_options(plane: Arc<C>, options: SessionOptions) -> Self {
        Self {
            plane,
            options,
            next_id: 0,
            pairs: HashMap::new(),
            active: BTreeMap::new(),
            endpoints: Arc::new(RwLock::new(HashMap::new())),
            strays: Vec::new(),
            cancel: CancelHandle::default(),
        }
    }

    /// Returns the control plane
    pub fn plane(&self) -> &Arc<C> {
        &self.plane
    }

    /// Returns a handle to cancel installations from another thread
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Returns a handle to read counters from another thread
    pub fn counter_reader(&self) -> CounterReader<C> {
        CounterReader { plane: self.plane.clone(), endpoints: self.endpoints.clone() }
    }

    /// Returns the state of a host pair
    pub fn state(&self, a: NodeId, b: NodeId) -> PairState {
        self.pairs.get(&HostPair::new(a, b)).cloned().unwrap_or_default()
    }

    /// Returns the active path with the given id
    pub fn active_path(&self, id: PathId) -> Option<&ActivePath> {
        self.active.get(&id)
    }

    /// Returns the active path of a host pair
    pub fn active_path_between(&self, a: NodeId, b: NodeId) -> Option<&ActivePath> {
        self.state(a, b).active_path().and_then(|id| self.active.get(&id))
    }

    /// Returns all active paths, ordered by their id
    pub fn active_paths(&self) -> impl Iterator<Item = &ActivePath> {
        self.active.values()
    }

    /// Returns the summaries of all active paths
    pub fn summaries(&self) -> Vec<PathSummary> {
        self.active.values().map(|p| p.summary()).collect()
    }

    /// Rules whose removal failed during a rollback, and which may still be installed. They are
    /// retried by [`SessionManager::teardown_all`].
    pub fn strays(&self) -> &[RuleId] {
        &self.strays
    }

    /// Plan and compile a path without touching the data plane. The rules are compiled with the
    /// id that the next created path would receive.
    pub fn plan_path(
        &self,
        graph: &TopologyGraph,
        source: NodeId,
        destination: NodeId,
        algorithm: &Algorithm,
    ) -> Result<(Path, Vec<FlowRule>), SessionError> {
        let path = algorithm.plan(graph, source, destination)?;
        let rules = compile(graph, &path, PathId(self.next_id))?;
        Ok((path, rules))
    }

    /// # Create a Path
    ///
    /// Plan the path, compile it and install its rules. If the pair already has an active path,
    /// that path is torn down first. Planning and compilation errors leave no state behind. If the
    /// installation fails, the rules of the batch are rolled back, the pair moves into the
    /// `Failed` state, and the error of the control plane is returned.
    ///
    /// If a teardown was requested through the [`CancelHandle`] during the installation, the
    /// rules are removed right after the batch finished, and [`SessionError::Cancelled`] is
    /// returned.
    pub fn create_path(
        &mut self,
        graph: &TopologyGraph,
        source: NodeId,
        destination: NodeId,
        algorithm: &Algorithm,
    ) -> Result<&ActivePath, SessionError> {
        let path = algorithm.plan(graph, source, destination)?;
        let id = PathId(self.next_id);
        let rules = compile(graph, &path, id)?;
        let names = path.names(graph)?;
        let endpoints = endpoint_ports(graph, &path)?;
        self.next_id += 1;

        let pair = HostPair::new(source, destination);
        if let Some(old) = self.state(source, destination).active_path() {
            info!("Replacing {} between {} and {}", old, names[0], names[names.len() - 1]);
            self.teardown_path(old)?;
        }

        self.transition(pair, PairEvent::BeginInstall(id))?;
        self.cancel.begin(pair);
        info!("Installing {}: {}", id, names.join(" -> "));

        if let Err(failure) = install_all(&self.plane, &rules, &self.options.batch()) {
            self.cancel.finish(pair);
            if !failure.leftover.is_empty() {
                warn!("{} rules of {} could not be rolled back", failure.leftover.len(), id);
                self.strays.extend(failure.leftover);
            }
            self.transition(pair, PairEvent::InstallFailed(failure.error.to_string()))?;
            return Err(failure.error.into());
        }

        self.transition(pair, PairEvent::InstallSucceeded)?;
        self.active.insert(
            id,
            ActivePath { id, pair, path, names, rules, algorithm: algorithm.kind() },
        );
        self.write_endpoints().insert(id, endpoints);

        if self.cancel.finish(pair) {
            info!("Teardown of {} was requested during the installation", id);
            self.teardown_path(id)?;
            return Err(SessionError::Cancelled(id));
        }

        info!("{} is active", id);
        self.active.get(&id).ok_or(SessionError::UnknownPath(id))
    }

    /// Create a path from a request that references the nodes by name.
    pub fn create_path_from_request(
        &mut self,
        graph: &TopologyGraph,
        request: &PathRequest,
    ) -> Result<&ActivePath, SessionError> {
        let (source, destination, algorithm) = request.resolve(graph)?;
        self.create_path(graph, source, destination, &algorithm)
    }

    /// # Teardown a Path
    ///
    /// Remove all rules of the path and forget it. Tearing down a path which is not active does
    /// nothing. If some rules cannot be removed, the path stays active, such that the teardown can
    /// be retried.
    pub fn teardown_path(&mut self, id: PathId) -> Result<(), SessionError> {
        let (pair, rule_ids) = match self.active.get(&id) {
            Some(active) => (active.pair, active.rule_ids()),
            None => {
                debug!("{} is not active, nothing to tear down", id);
                return Ok(());
            }
        };

        self.transition(pair, PairEvent::BeginTeardown)?;
        info!("Tearing down {}", id);
        if let Err(failure) = remove_all(&self.plane, &rule_ids, &self.options.batch()) {
            self.transition(pair, PairEvent::TeardownFailed)?;
            return Err(failure.error.into());
        }

        self.transition(pair, PairEvent::TeardownFinished)?;
        self.active.remove(&id);
        self.write_endpoints().remove(&id);
        info!("{} is torn down", id);
        Ok(())
    }

    /// Tear down every active path, and retry the removal of all stray rules. All paths are
    /// attempted, even if one of them fails. The first error is returned.
    pub fn teardown_all(&mut self) -> Result<(), SessionError> {
        let mut first_error = None;
        let ids: Vec<PathId> = self.active.keys().copied().collect();
        for id in ids {
            if let Err(e) = self.teardown_path(id) {
                error!("Could not tear down {}: {}", id, e);
                first_error.get_or_insert(e);
            }
        }

        if !self.strays.is_empty() {
            let strays = std::mem::take(&mut self.strays);
            info!("Retrying the removal of {} stray rules", strays.len());
            if let Err(failure) = remove_all(&self.plane, &strays, &self.options.batch()) {
                warn!("{} stray rules remain: {}", failure.leftover.len(), failure.error);
                self.strays = failure.leftover;
                first_error.get_or_insert(failure.error.into());
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Read the counters of the switch ports facing both endpoints of the path.
    pub fn stats_for(&self, id: PathId) -> Result<PathStats, SessionError> {
        self.counter_reader().stats_for(id)
    }

    /// Read how much traffic matched each installed rule of the path. Rules that are missing on
    /// their switch are skipped. Fails with [`SessionError::Control`] if the control plane does not
    /// support flow statistics.
    pub fn flow_stats_for(&self, id: PathId) -> Result<Vec<FlowStats>, SessionError> {
        let active = self.active.get(&id).ok_or(SessionError::UnknownPath(id))?;
        let mut stats = Vec::with_capacity(active.rules.len());
        for rule in active.rules.iter() {
            match self.plane.read_flow_stats(&rule.id)? {
                Some(s) => stats.push(s),
                None => warn!("Rule {} is missing on its switch", rule.id),
            }
        }
        Ok(stats)
    }

    fn transition(&mut self, pair: HostPair, event: PairEvent) -> Result<(), SessionError> {
        let current = self.pairs.get(&pair).cloned().unwrap_or_default();
        let next = current.next(&event)?;
        trace!("{:?}: {} -> {}", pair, current, next);
        if next == PairState::NoPath {
            self.pairs.remove(&pair);
        } else {
            self.pairs.insert(pair, next);
        }
        Ok(())
    }

    fn write_endpoints(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<PathId, Endpoints>> {
        match self.endpoints.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Find the switch ports facing the two endpoint hosts of the path.
fn endpoint_ports(graph: &TopologyGraph, path: &Path) -> Result<Endpoints, TopologyError> {
    let switches = path.switches();
    match (switches.first(), switches.last()) {
        (Some(first), Some(last)) => Ok(Some((
            SwitchPort {
                switch: graph.node_name(*first)?.to_string(),
                port: graph.port_to(*first, path.source())?,
            },
            SwitchPort {
                switch: graph.node_name(*last)?.to_string(),
                port: graph.port_to(*last, path.destination())?,
            },
        ))),
        _ => Ok(None),
    }
}

/// Session Errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// The path could not be planned
    #[error("Planning Error: {0}")]
    Plan(#[from] PlanError),
    /// The path could not be compiled
    #[error("Compilation Error: {0}")]
    Compile(#[from] CompileError),
    /// The control plane failed
    #[error("Control Plane Error: {0}")]
    Control(#[from] ControlError),
    /// A node could not be found
    #[error("Topology Error: {0}")]
    Topology(#[from] TopologyError),
    /// A teardown was requested while the path was installed. Its rules were removed again.
    #[error("Installation of {0} was cancelled")]
    Cancelled(PathId),
    /// The path is not active
    #[error("Path {0} is not active")]
    UnknownPath(PathId),
    /// The event is not allowed in the current state of the pair
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}
