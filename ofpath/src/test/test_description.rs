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

//! Test loading and generating topology descriptions.

use crate::topology::*;
use crate::Error;
use maplit::btreemap;
use std::net::Ipv4Addr;

const DESCRIPTION: &str = r#"{
    "nodes": [
        { "id": "h1", "kind": "host", "ip": "10.0.0.1/8", "mac": "00:00:00:00:00:01" },
        { "id": "h2", "kind": "host", "ip": "10.0.0.2" },
        { "id": "s1", "kind": "switch" },
        { "id": "s2", "kind": "switch" }
    ],
    "links": [
        { "a": "h1", "b": "s1", "bandwidth": 10.0, "delay": "5ms" },
        { "a": "s2", "b": "s1", "loss": 1.5, "cost": 3.0 },
        { "a": "s2", "b": "h2" }
    ]
}"#;

#[test]
fn test_build() {
    let g = TopologyDescription::from_json(DESCRIPTION).unwrap().build().unwrap();
    let h1 = g.node_id("h1").unwrap();
    let h2 = g.node_id("h2").unwrap();
    let s1 = g.node_id("s1").unwrap();
    let s2 = g.node_id("s2").unwrap();

    assert_eq!(g.node(h1).unwrap().ip(), Some(Ipv4Addr::new(10, 0, 0, 1)));
    assert_eq!(g.node(h1).unwrap().mac(), Some(MacAddr([0, 0, 0, 0, 0, 1])));
    assert_eq!(g.node(h2).unwrap().ip(), Some(Ipv4Addr::new(10, 0, 0, 2)));
    assert_eq!(g.node(h2).unwrap().mac(), None);

    // ports follow the order of the links
    assert_eq!(g.port_map(s1), Ok(btreemap! {"h1".to_string() => 1, "s2".to_string() => 2}));
    assert_eq!(g.port_map(s2), Ok(btreemap! {"s1".to_string() => 1, "h2".to_string() => 2}));

    let link = g.link(s1, s2).unwrap();
    assert_eq!(link.cost(), 3.0);
    assert_eq!(link.attrs().loss, Some(1.5));
    assert_eq!(g.link(h1, s1).unwrap().attrs().delay.as_deref(), Some("5ms"));
}

#[test]
fn test_round_trip() {
    let g = TopologyDescription::from_json(DESCRIPTION).unwrap().build().unwrap();
    let description = g.describe();

    let s1 = description.nodes.iter().find(|n| n.id == "s1").unwrap();
    assert_eq!(s1.ports, btreemap! {"h1".to_string() => 1, "s2".to_string() => 2});
    let h1 = description.nodes.iter().find(|n| n.id == "h1").unwrap();
    assert_eq!(h1.ip.as_deref(), Some("10.0.0.1"));

    let json = description.to_json().unwrap();
    let rebuilt = TopologyDescription::from_json(&json).unwrap().build().unwrap();
    assert_eq!(rebuilt.describe(), description);
}

#[test]
fn test_invalid_descriptions() {
    let description = TopologyDescription {
        nodes: vec![NodeRecord {
            id: "h1".to_string(),
            kind: NodeKind::Host,
            ip: None,
            mac: Some("00:00:00:00:01".to_string()),
            ports: Default::default(),
        }],
        links: vec![],
    };
    assert_eq!(
        description.build().map(|_| ()),
        Err(TopologyError::InvalidAddress("00:00:00:00:01".to_string()))
    );

    let description = TopologyDescription::from_json(
        r#"{"nodes": [{"id": "s1", "kind": "switch"}], "links": [{"a": "s1", "b": "s2"}]}"#,
    )
    .unwrap();
    assert_eq!(description.build().map(|_| ()), Err(TopologyError::UnknownNode("s2".to_string())));

    let description = TopologyDescription::from_json(
        r#"{"nodes": [{"id": "s1", "kind": "switch"}, {"id": "s1", "kind": "switch"}]}"#,
    )
    .unwrap();
    assert!(description.links.is_empty());
    assert_eq!(description.build().map(|_| ()), Err(TopologyError::DuplicateNode("s1".to_string())));

    assert!(matches!(
        TopologyDescription::from_json(r#"{"nodes": [{"id": "r1", "kind": "router"}]}"#),
        Err(Error::JsonError(_))
    ));
    assert!(matches!(TopologyDescription::from_file("/nonexistent/topo.json"), Err(Error::IoError(_))));
}
