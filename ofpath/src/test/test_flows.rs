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

//! Test the compilation of paths into flow rules.

use crate::flows::*;
use crate::planner::{bfs_path, unchecked_path};
use crate::topology::{LinkAttrs, MacAddr, NodeId, TopologyGraph};
use lazy_static::lazy_static;
use std::net::Ipv4Addr;

lazy_static! {
    static ref H1: NodeId = 0.into();
    static ref H2: NodeId = 1.into();
    static ref S1: NodeId = 2.into();
    static ref S2: NodeId = 3.into();
    static ref S3: NodeId = 4.into();
    static ref MAC1: MacAddr = MacAddr([0, 0, 0, 0, 0, 1]);
    static ref MAC2: MacAddr = MacAddr([0, 0, 0, 0, 0, 2]);
    static ref IP1: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    static ref IP2: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
}

/// # Test topology
///
/// ```text
/// H1 ---- S1 ---- S2 ---- H2          S3
/// ```
fn get_test_topo(with_mac: bool, with_ip: bool) -> TopologyGraph {
    let mut g = TopologyGraph::new();
    let mac = |m: &MacAddr| if with_mac { Some(*m) } else { None };
    let ip = |i: &Ipv4Addr| if with_ip { Some(*i) } else { None };

    assert_eq!(*H1, g.add_host("h1", ip(&IP1), mac(&MAC1)).unwrap());
    assert_eq!(*H2, g.add_host("h2", ip(&IP2), mac(&MAC2)).unwrap());
    assert_eq!(*S1, g.add_switch("s1").unwrap());
    assert_eq!(*S2, g.add_switch("s2").unwrap());
    assert_eq!(*S3, g.add_switch("s3").unwrap());

    g.add_link(*H1, *S1, LinkAttrs::default()).unwrap();
    g.add_link(*S1, *S2, LinkAttrs::default()).unwrap();
    g.add_link(*S2, *H2, LinkAttrs::default()).unwrap();

    g
}

#[test]
fn test_compile_path() {
    let g = get_test_topo(true, true);
    let path = bfs_path(&g, *H1, *H2).unwrap();
    let rules = compile(&g, &path, PathId(3)).unwrap();

    let forward = Classifier::Ethernet { src: *MAC1, dst: *MAC2 };
    let reverse = Classifier::Ethernet { src: *MAC2, dst: *MAC1 };
    assert_eq!(
        rules,
        vec![
            FlowRule {
                id: RuleId::new(PathId(3), "s1", Direction::Forward),
                in_port: 1,
                out_port: 2,
                classifier: forward,
                priority: PATH_PRIORITY,
            },
            FlowRule {
                id: RuleId::new(PathId(3), "s1", Direction::Reverse),
                in_port: 2,
                out_port: 1,
                classifier: reverse,
                priority: PATH_PRIORITY,
            },
            FlowRule {
                id: RuleId::new(PathId(3), "s2", Direction::Forward),
                in_port: 1,
                out_port: 2,
                classifier: forward,
                priority: PATH_PRIORITY,
            },
            FlowRule {
                id: RuleId::new(PathId(3), "s2", Direction::Reverse),
                in_port: 2,
                out_port: 1,
                classifier: reverse,
                priority: PATH_PRIORITY,
            },
        ]
    );
    assert!(rules.iter().all(|r| r.priority > DEFAULT_FORWARDING_PRIORITY));
}

#[test]
fn test_compile_idempotent() {
    let g = get_test_topo(true, true);
    let path = bfs_path(&g, *H1, *H2).unwrap();
    let a = compile(&g, &path, PathId(0)).unwrap();
    let b = compile(&g, &path, PathId(0)).unwrap();
    assert_eq!(a, b);
    assert_eq!(format!("{:?}", a), format!("{:?}", b));

    // another id only changes the identifiers
    let c = compile(&g, &path, PathId(1)).unwrap();
    assert_ne!(a, c);
    for (a, c) in a.iter().zip(c.iter()) {
        assert_eq!((a.in_port, a.out_port, a.classifier), (c.in_port, c.out_port, c.classifier));
        assert_eq!(a.switch(), c.switch());
    }
}

#[test]
fn test_classifier_fallback() {
    let path = unchecked_path(vec![*H1, *S1, *S2, *H2]);

    let g = get_test_topo(false, true);
    let rules = compile(&g, &path, PathId(0)).unwrap();
    assert_eq!(rules[0].classifier, Classifier::Ipv4 { src: *IP1, dst: *IP2 });
    assert_eq!(rules[1].classifier, Classifier::Ipv4 { src: *IP2, dst: *IP1 });

    let g = get_test_topo(false, false);
    assert_eq!(
        compile(&g, &path, PathId(0)),
        Err(CompileError::UnaddressedHosts("h1".to_string(), "h2".to_string()))
    );
}

#[test]
fn test_interrupted_path() {
    let g = get_test_topo(true, true);

    let path = unchecked_path(vec![*H1, *S1, *S3, *H2]);
    assert_eq!(
        compile(&g, &path, PathId(0)),
        Err(CompileError::InterruptedPath { switch: "s1".to_string(), neighbor: "s3".to_string() })
    );

    let path = unchecked_path(vec![*H1, *H2, *S2, *H2]);
    assert_eq!(compile(&g, &path, PathId(0)), Err(CompileError::NotASwitch("h2".to_string())));
}

#[test]
fn test_no_switch() {
    let mut g = TopologyGraph::new();
    let h1 = g.add_host("h1", None, Some(*MAC1)).unwrap();
    let h2 = g.add_host("h2", None, Some(*MAC2)).unwrap();
    g.add_link(h1, h2, LinkAttrs::default()).unwrap();

    let path = bfs_path(&g, h1, h2).unwrap();
    assert_eq!(compile(&g, &path, PathId(0)), Ok(vec![]));
}

#[test]
fn test_rule_id() {
    let forward = RuleId::new(PathId(3), "s1", Direction::Forward);
    let reverse = RuleId::new(PathId(3), "s1", Direction::Reverse);
    let other = RuleId::new(PathId(4), "s1", Direction::Forward);

    assert_eq!(forward.to_string(), "path3/s1/forward");
    assert_eq!(reverse.to_string(), "path3/s1/reverse");

    assert_ne!(forward.cookie(), reverse.cookie());
    assert_ne!(forward.cookie(), other.cookie());
    assert_eq!(forward.cookie() & !COOKIE_MASK, COOKIE_TAG);
    assert_eq!(RuleId::parse_cookie(reverse.cookie()), Some((PathId(3), Direction::Reverse)));
    assert_eq!(RuleId::parse_cookie(0), None);
    assert_eq!(RuleId::parse_cookie(0x1234), None);
}
