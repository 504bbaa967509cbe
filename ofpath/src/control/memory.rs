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

//! In-memory data plane.

use super::{ControlError, ControlPlane, FlowStats, PortCounters};
use crate::flows::{FlowRule, RuleId};
use crate::topology::{PortNo, TopologyGraph};

use log::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, BTreeMap<RuleId, FlowRule>>,
    counters: HashMap<(String, PortNo), PortCounters>,
    flow_counters: HashMap<RuleId, (u64, u64)>,
    /// If set, only these switches (and ports) exist.
    known: Option<HashMap<String, HashSet<PortNo>>>,
    failing: HashSet<String>,
    latency: Duration,
    install_calls: usize,
    remove_calls: usize,
}

/// # Memory Data Plane
///
/// [`ControlPlane`] which keeps one flow table per switch in memory. Install and remove are
/// idempotent, the counters can be set from the outside, and failures and latency can be injected
/// to exercise the error handling of the callers. It is used for dry runs and in tests.
///
/// ```rust
/// use ofpath::control::{ControlPlane, MemoryDataPlane, PortCounters};
///
/// let plane = MemoryDataPlane::new();
/// plane.set_counters("s1", 1, PortCounters { rx_packets: 3, ..Default::default() });
/// assert_eq!(plane.read_counters("s1", 1).unwrap().rx_packets, 3);
/// plane.fail_switch("s1");
/// assert!(plane.read_counters("s1", 1).is_err());
/// ```
#[derive(Debug, Default)]
pub struct MemoryDataPlane {
    state: Mutex<State>,
}

impl MemoryDataPlane {
    /// Create a data plane which accepts any switch and any port.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a data plane which only knows the switches (and their ports) of the topology.
    /// Requests to other switches fail with [`ControlError::ControlChannel`].
    pub fn for_topology(graph: &TopologyGraph) -> Self {
        let known: HashMap<String, HashSet<PortNo>> = graph
            .switches()
            .into_iter()
            .filter_map(|s| {
                let name = graph.node_name(s).ok()?.to_string();
                let ports = graph.port_map(s).ok()?.into_iter().map(|(_, p)| p).collect();
                Some((name, ports))
            })
            .collect();
        let plane = Self::default();
        plane.lock().known = Some(known);
        plane
    }

    /// Make every request to the switch fail, until [`MemoryDataPlane::heal_switch`] is called.
    pub fn fail_switch(&self, switch: impl Into<String>) {
        self.lock().failing.insert(switch.into());
    }

    /// Stop injecting failures for the switch
    pub fn heal_switch(&self, switch: &str) {
        self.lock().failing.remove(switch);
    }

    /// Delay every request by the given duration
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Set the counters of a switch port
    pub fn set_counters(&self, switch: impl Into<String>, port: PortNo, counters: PortCounters) {
        self.lock().counters.insert((switch.into(), port), counters);
    }

    /// Set the traffic which matched a rule
    pub fn set_flow_counters(&self, rule: RuleId, n_packets: u64, n_bytes: u64) {
        self.lock().flow_counters.insert(rule, (n_packets, n_bytes));
    }

    /// Returns all installed rules, ordered by switch and rule id.
    pub fn installed_rules(&self) -> Vec<FlowRule> {
        let state = self.lock();
        let mut switches: Vec<&String> = state.tables.keys().collect();
        switches.sort();
        switches.into_iter().flat_map(|s| state.tables[s].values().cloned()).collect()
    }

    /// Returns all rules installed on a switch
    pub fn rules_on(&self, switch: &str) -> Vec<FlowRule> {
        self.lock().tables.get(switch).map(|t| t.values().cloned().collect()).unwrap_or_default()
    }

    /// Returns true if the rule is installed
    pub fn is_installed(&self, rule: &RuleId) -> bool {
        self.lock().tables.get(&rule.switch).map(|t| t.contains_key(rule)).unwrap_or(false)
    }

    /// Returns the number of installed rules
    pub fn num_installed(&self) -> usize {
        self.lock().tables.values().map(|t| t.len()).sum()
    }

    /// Returns how often install was called
    pub fn num_install_calls(&self) -> usize {
        self.lock().install_calls
    }

    /// Returns how often remove was called
    pub fn num_remove_calls(&self) -> usize {
        self.lock().remove_calls
    }

    /// A poisoned lock only means that a test thread panicked, the tables are still consistent.
    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Sleep for the configured latency, without holding the lock.
    fn delay(&self) {
        let latency = self.lock().latency;
        if latency > Duration::from_secs(0) {
            thread::sleep(latency);
        }
    }
}

impl State {
    fn check_switch(&self, switch: &str) -> Result<(), ControlError> {
        if self.failing.contains(switch) {
            return Err(ControlError::channel(switch, "connection refused"));
        }
        match self.known.as_ref() {
            Some(known) if !known.contains_key(switch) => {
                Err(ControlError::channel(switch, "no such switch"))
            }
            _ => Ok(()),
        }
    }
}

impl ControlPlane for MemoryDataPlane {
    fn install(&self, rule: &FlowRule) -> Result<(), ControlError> {
        self.delay();
        let mut state = self.lock();
        state.install_calls += 1;
        state.check_switch(rule.switch())?;
        trace!("install {}", rule);
        state
            .tables
            .entry(rule.switch().to_string())
            .or_default()
            .insert(rule.id.clone(), rule.clone());
        Ok(())
    }

    fn remove(&self, rule: &RuleId) -> Result<(), ControlError> {
        self.delay();
        let mut state = self.lock();
        state.remove_calls += 1;
        state.check_switch(&rule.switch)?;
        trace!("remove {}", rule);
        if let Some(table) = state.tables.get_mut(&rule.switch) {
            table.remove(rule);
        }
        Ok(())
    }

    fn read_counters(&self, switch: &str, port: PortNo) -> Result<PortCounters, ControlError> {
        self.delay();
        let state = self.lock();
        let unavailable = |reason: &str| ControlError::CounterUnavailable {
            switch: switch.to_string(),
            port,
            reason: reason.to_string(),
        };
        if state.failing.contains(switch) {
            return Err(unavailable("connection refused"));
        }
        if let Some(known) = state.known.as_ref() {
            match known.get(switch) {
                None => return Err(unavailable("no such switch")),
                Some(ports) if !ports.contains(&port) => return Err(unavailable("no such port")),
                _ => {}
            }
        }
        Ok(state.counters.get(&(switch.to_string(), port)).copied().unwrap_or_default())
    }

    fn read_flow_stats(&self, rule: &RuleId) -> Result<Option<FlowStats>, ControlError> {
        self.delay();
        let state = self.lock();
        state.check_switch(&rule.switch)?;
        let installed =
            state.tables.get(&rule.switch).map(|t| t.contains_key(rule)).unwrap_or(false);
        if !installed {
            return Ok(None);
        }
        let (n_packets, n_bytes) = state.flow_counters.get(rule).copied().unwrap_or_default();
        Ok(Some(FlowStats { rule: rule.clone(), n_packets, n_bytes }))
    }
}
