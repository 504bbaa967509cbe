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

//! Test the in-memory data plane and the batch operations.

use crate::control::*;
use crate::flows::*;
use crate::planner::bfs_path;
use crate::topology::{LinkAttrs, MacAddr, PortNo, TopologyGraph};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// # Test topology
///
/// ```text
/// h1 ---- s1 ---- s2 ---- h2
/// ```
fn get_test_topo() -> TopologyGraph {
    let mut g = TopologyGraph::new();
    let h1 = g.add_host("h1", None, Some(MacAddr([0, 0, 0, 0, 0, 1]))).unwrap();
    let h2 = g.add_host("h2", None, Some(MacAddr([0, 0, 0, 0, 0, 2]))).unwrap();
    let s1 = g.add_switch("s1").unwrap();
    let s2 = g.add_switch("s2").unwrap();
    g.add_link(h1, s1, LinkAttrs::default()).unwrap();
    g.add_link(s1, s2, LinkAttrs::default()).unwrap();
    g.add_link(s2, h2, LinkAttrs::default()).unwrap();
    g
}

/// Returns the four rules of the path h1 -> s1 -> s2 -> h2
fn get_test_rules(g: &TopologyGraph) -> Vec<FlowRule> {
    let h1 = g.node_id("h1").unwrap();
    let h2 = g.node_id("h2").unwrap();
    compile(g, &bfs_path(g, h1, h2).unwrap(), PathId(0)).unwrap()
}

fn sequential() -> BatchOptions {
    BatchOptions { timeout: Duration::from_secs(5), parallelism: 1 }
}

#[test]
fn test_install_idempotent() {
    let g = get_test_topo();
    let rules = get_test_rules(&g);
    let plane = MemoryDataPlane::for_topology(&g);

    plane.install(&rules[0]).unwrap();
    plane.install(&rules[0]).unwrap();
    assert_eq!(plane.num_installed(), 1);
    assert_eq!(plane.rules_on("s1"), vec![rules[0].clone()]);
    assert!(plane.is_installed(&rules[0].id));

    plane.remove(&rules[0].id).unwrap();
    plane.remove(&rules[0].id).unwrap();
    plane.remove(&rules[3].id).unwrap();
    assert_eq!(plane.num_installed(), 0);
    assert!(!plane.is_installed(&rules[0].id));

    assert_eq!(plane.num_install_calls(), 2);
    assert_eq!(plane.num_remove_calls(), 3);
}

#[test]
fn test_unknown_switch() {
    let g = get_test_topo();
    let plane = MemoryDataPlane::for_topology(&g);
    let mut rule = get_test_rules(&g).remove(0);
    rule.id.switch = "s9".to_string();

    assert_eq!(
        plane.install(&rule),
        Err(ControlError::ControlChannel { switch: "s9".to_string(), reason: "no such switch".to_string() })
    );

    // the permissive data plane accepts every switch
    let plane = MemoryDataPlane::new();
    assert_eq!(plane.install(&rule), Ok(()));
    assert_eq!(plane.rules_on("s9").len(), 1);
}

#[test]
fn test_batch() {
    let g = get_test_topo();
    let rules = get_test_rules(&g);
    let plane = Arc::new(MemoryDataPlane::for_topology(&g));
    let options = BatchOptions { timeout: Duration::from_secs(5), parallelism: 4 };

    install_all(&plane, &rules, &options).unwrap();
    assert_eq!(plane.installed_rules(), rules);

    // installing again changes nothing
    install_all(&plane, &rules, &options).unwrap();
    assert_eq!(plane.num_installed(), 4);

    let ids: Vec<RuleId> = rules.iter().map(|r| r.id.clone()).collect();
    remove_all(&plane, &ids, &options).unwrap();
    assert_eq!(plane.num_installed(), 0);
    remove_all(&plane, &ids, &options).unwrap();

    // empty batches do nothing
    install_all(&plane, &[], &options).unwrap();
    remove_all(&plane, &[], &options).unwrap();
    assert_eq!(plane.num_install_calls(), 8);
}

#[test]
fn test_batch_rollback() {
    let g = get_test_topo();
    let rules = get_test_rules(&g);
    let plane = Arc::new(MemoryDataPlane::for_topology(&g));
    plane.fail_switch("s2");

    let failure = install_all(&plane, &rules, &sequential()).unwrap_err();
    assert_eq!(
        failure.error,
        ControlError::ControlChannel { switch: "s2".to_string(), reason: "connection refused".to_string() }
    );
    assert!(failure.leftover.is_empty());
    assert_eq!(plane.num_installed(), 0);
    // the reverse rule on s2 was never attempted
    assert_eq!(plane.num_install_calls(), 3);
    // both rules on s1 were removed
    assert_eq!(plane.num_remove_calls(), 2);
}

#[test]
fn test_batch_rollback_parallel() {
    let g = get_test_topo();
    let rules = get_test_rules(&g);
    let plane = Arc::new(MemoryDataPlane::for_topology(&g));
    plane.fail_switch("s2");
    let options = BatchOptions { timeout: Duration::from_secs(5), parallelism: 4 };

    for _ in 0..10 {
        let failure = install_all(&plane, &rules, &options).unwrap_err();
        assert!(matches!(failure.error, ControlError::ControlChannel { .. }));
        assert!(failure.leftover.is_empty());
        assert_eq!(plane.num_installed(), 0);
    }
}

#[test]
fn test_remove_failure() {
    let g = get_test_topo();
    let rules = get_test_rules(&g);
    let plane = Arc::new(MemoryDataPlane::for_topology(&g));
    install_all(&plane, &rules, &sequential()).unwrap();

    plane.fail_switch("s1");
    let ids: Vec<RuleId> = rules.iter().map(|r| r.id.clone()).collect();
    let failure = remove_all(&plane, &ids, &sequential()).unwrap_err();
    // all removals are attempted
    assert_eq!(plane.rules_on("s2").len(), 0);
    assert_eq!(failure.leftover, vec![ids[0].clone(), ids[1].clone()]);

    plane.heal_switch("s1");
    remove_all(&plane, &failure.leftover, &sequential()).unwrap();
    assert_eq!(plane.num_installed(), 0);
}

#[test]
fn test_batch_timeout() {
    let g = get_test_topo();
    let rules = get_test_rules(&g);
    let plane = Arc::new(MemoryDataPlane::for_topology(&g));
    plane.set_latency(Duration::from_millis(200));
    let options = BatchOptions { timeout: Duration::from_millis(50), parallelism: 2 };

    let failure = install_all(&plane, &rules, &options).unwrap_err();
    assert!(matches!(failure.error, ControlError::ControlChannel { .. }));

    // wait until the late installs and removals are done
    thread::sleep(Duration::from_millis(1000));
    assert_eq!(plane.num_installed(), 0);
}

#[test]
fn test_counters() {
    let g = get_test_topo();
    let plane = MemoryDataPlane::for_topology(&g);
    let counters = PortCounters { rx_packets: 10, tx_packets: 20, rx_bytes: 1000, tx_bytes: 2000 };
    plane.set_counters("s1", 1, counters);

    assert_eq!(plane.read_counters("s1", 1), Ok(counters));
    assert_eq!(plane.read_counters("s1", 2), Ok(PortCounters::default()));

    let unavailable = |switch: &str, port: PortNo, reason: &str| {
        Err(ControlError::CounterUnavailable {
            switch: switch.to_string(),
            port,
            reason: reason.to_string(),
        })
    };
    assert_eq!(plane.read_counters("s1", 7), unavailable("s1", 7, "no such port"));
    assert_eq!(plane.read_counters("s9", 1), unavailable("s9", 1, "no such switch"));
    plane.fail_switch("s1");
    assert_eq!(plane.read_counters("s1", 1), unavailable("s1", 1, "connection refused"));
    assert!(plane.read_counters("s1", 1).unwrap_err().is_soft());
}

#[test]
fn test_flow_stats() {
    let g = get_test_topo();
    let rules = get_test_rules(&g);
    let plane = MemoryDataPlane::for_topology(&g);

    assert_eq!(plane.read_flow_stats(&rules[0].id), Ok(None));
    plane.install(&rules[0]).unwrap();
    plane.set_flow_counters(rules[0].id.clone(), 5, 500);
    assert_eq!(
        plane.read_flow_stats(&rules[0].id),
        Ok(Some(FlowStats { rule: rules[0].id.clone(), n_packets: 5, n_bytes: 500 }))
    );
}

/// Control plane which only implements the mandatory operations
struct Minimal;

impl ControlPlane for Minimal {
    fn install(&self, _rule: &FlowRule) -> Result<(), ControlError> {
        Ok(())
    }

    fn remove(&self, _rule: &RuleId) -> Result<(), ControlError> {
        Ok(())
    }

    fn read_counters(&self, _switch: &str, _port: PortNo) -> Result<PortCounters, ControlError> {
        Ok(PortCounters::default())
    }
}

#[test]
fn test_flow_stats_unsupported() {
    let g = get_test_topo();
    let rules = get_test_rules(&g);
    let e = Minimal.read_flow_stats(&rules[0].id).unwrap_err();
    assert_eq!(e, ControlError::Unsupported("flow statistics"));
    assert!(e.is_soft());
}

/// Control plane whose worker panics when it touches one specific rule.
pub(super) struct PanickingPlane {
    pub(super) inner: MemoryDataPlane,
    pub(super) rule: RuleId,
    pub(super) on_install: bool,
}

impl ControlPlane for PanickingPlane {
    fn install(&self, rule: &FlowRule) -> Result<(), ControlError> {
        if self.on_install && rule.id == self.rule {
            panic!("switch agent crashed while installing {}", rule.id);
        }
        self.inner.install(rule)
    }

    fn remove(&self, rule: &RuleId) -> Result<(), ControlError> {
        if !self.on_install && *rule == self.rule {
            panic!("switch agent crashed while removing {}", rule);
        }
        self.inner.remove(rule)
    }

    fn read_counters(&self, switch: &str, port: PortNo) -> Result<PortCounters, ControlError> {
        self.inner.read_counters(switch, port)
    }
}

#[test]
fn test_install_worker_panics() {
    let g = get_test_topo();
    let rules = get_test_rules(&g);

    for parallelism in [1, 4].iter() {
        let plane = Arc::new(PanickingPlane {
            inner: MemoryDataPlane::for_topology(&g),
            rule: rules[1].id.clone(),
            on_install: true,
        });
        let options = BatchOptions { timeout: Duration::from_secs(5), parallelism: *parallelism };

        let failure = install_all(&plane, &rules, &options).unwrap_err();
        assert_eq!(
            failure.error,
            ControlError::ControlChannel {
                switch: "s1".to_string(),
                reason: "batch worker terminated".to_string()
            }
        );
        assert!(failure.leftover.is_empty());
        // everything that was installed before the crash is rolled back
        assert_eq!(plane.inner.num_installed(), 0);
    }
}

#[test]
fn test_remove_worker_panics() {
    let g = get_test_topo();
    let rules = get_test_rules(&g);
    let plane = Arc::new(PanickingPlane {
        inner: MemoryDataPlane::for_topology(&g),
        rule: rules[1].id.clone(),
        on_install: false,
    });
    install_all(&plane, &rules, &sequential()).unwrap();

    let ids: Vec<RuleId> = rules.iter().map(|r| r.id.clone()).collect();
    let failure = remove_all(&plane, &ids, &sequential()).unwrap_err();
    assert!(matches!(failure.error, ControlError::ControlChannel { .. }));
    // the crashed rule and all rules after it were never confirmed
    assert_eq!(failure.leftover, ids[1..].to_vec());
    assert!(plane.inner.is_installed(&ids[1]));
}
