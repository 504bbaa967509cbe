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

//! Text codec for `ovs-ofctl`: rendering flow rules, and parsing the output of `dump-ports` and
//! `dump-flows`.

use crate::RuntimeError;
use ofpath::control::PortCounters;
use ofpath::flows::{Classifier, FlowRule, RuleId, COOKIE_MASK, COOKIE_TAG};
use ofpath::topology::PortNo;

use regex::Regex;
use std::collections::BTreeMap;

/// Render the rule in the flow syntax of `ovs-ofctl add-flow`.
///
/// ```
/// # use ofpath::flows::*;
/// # use ofpath::topology::MacAddr;
/// # use ofpath_runtime::ofctl::render_flow;
/// let rule = FlowRule {
///     id: RuleId::new(PathId(1), "s1", Direction::Reverse),
///     in_port: 2,
///     out_port: 1,
///     classifier: Classifier::Ethernet {
///         src: MacAddr([0, 0, 0, 0, 0, 2]),
///         dst: MacAddr([0, 0, 0, 0, 0, 1]),
///     },
///     priority: 1000,
/// };
/// assert_eq!(
///     render_flow(&rule),
///     "cookie=0x6f70000000000003,priority=1000,in_port=2,\
///      dl_src=00:00:00:00:00:02,dl_dst=00:00:00:00:00:01,actions=output:1"
/// );
/// ```
pub fn render_flow(rule: &FlowRule) -> String {
    let classifier = match rule.classifier {
        Classifier::Ethernet { src, dst } => format!("dl_src={},dl_dst={}", src, dst),
        Classifier::Ipv4 { src, dst } => format!("ip,nw_src={},nw_dst={}", src, dst),
    };
    format!(
        "cookie={:#018x},priority={},in_port={},{},actions=output:{}",
        rule.id.cookie(),
        rule.priority,
        rule.in_port,
        classifier,
        rule.out_port
    )
}

/// Match of `del-flows` and `dump-flows` that selects exactly the rule with the given id.
pub fn rule_match(rule: &RuleId) -> String {
    format!("cookie={:#018x}/-1", rule.cookie())
}

/// Match of `del-flows` that selects every rule installed by this crate.
pub fn tagged_match() -> String {
    format!("cookie={:#018x}/{:#018x}", COOKIE_TAG, !COOKIE_MASK)
}

/// Statistics of a single flow, as reported by `dump-flows`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowEntry {
    /// Cookie of the flow
    pub cookie: u64,
    /// Priority of the flow
    pub priority: u16,
    /// Matched packets
    pub n_packets: u64,
    /// Matched bytes
    pub n_bytes: u64,
}

/// # Parser for the output of `ovs-ofctl`
///
/// Holds the compiled regular expressions.
#[derive(Debug, Clone)]
pub struct OfctlParser {
    port_re: Regex,
    rx_re: Regex,
    tx_re: Regex,
    cookie_re: Regex,
    n_packets_re: Regex,
    n_bytes_re: Regex,
    priority_re: Regex,
}

impl OfctlParser {
    /// Compile all regular expressions
    pub fn new() -> Result<Self, RuntimeError> {
        Ok(Self {
            port_re: Regex::new(r#"^\s*port\s+"?([A-Za-z0-9_\-.]+)"?:"#)?,
            rx_re: Regex::new(r"rx pkts=(\d+|\?), bytes=(\d+|\?)")?,
            tx_re: Regex::new(r"tx pkts=(\d+|\?), bytes=(\d+|\?)")?,
            cookie_re: Regex::new(r"cookie=0x([0-9a-fA-F]+)")?,
            n_packets_re: Regex::new(r"n_packets=(\d+)")?,
            n_bytes_re: Regex::new(r"n_bytes=(\d+)")?,
            priority_re: Regex::new(r"priority=(\d+)")?,
        })
    }

    /// Parse the output of `dump-ports`. Returns the counters of every port, by the name that
    /// `ovs-ofctl` prints (the port number, or `LOCAL`). Counters which the switch does not
    /// support (printed as `?`) are reported as zero.
    ///
    /// ```text
    /// OFPST_PORT reply (OF1.3) (xid=0x2): 2 ports
    ///   port  1: rx pkts=10, bytes=980, drop=0, errs=0, frame=0, over=0, crc=0
    ///            tx pkts=9, bytes=882, drop=0, errs=0, coll=0
    ///            duration=12.5s
    ///   port LOCAL: rx pkts=0, bytes=0, drop=0, errs=0, frame=0, over=0, crc=0
    ///            tx pkts=0, bytes=0, drop=0, errs=0, coll=0
    /// ```
    pub fn parse_port_stats(
        &self,
        output: &str,
    ) -> Result<BTreeMap<String, PortCounters>, RuntimeError> {
        let mut result = BTreeMap::new();
        let mut current: Option<(String, PortCounters)> = None;

        for line in output.lines() {
            if let Some(cap) = self.port_re.captures(line) {
                if let Some((name, counters)) = current.take() {
                    result.insert(name, counters);
                }
                current = Some((cap[1].to_string(), PortCounters::default()));
            }
            if let Some(cap) = self.rx_re.captures(line) {
                let (_, counters) = current.as_mut().ok_or_else(|| orphan(line))?;
                counters.rx_packets = counter(&cap[1])?;
                counters.rx_bytes = counter(&cap[2])?;
            }
            if let Some(cap) = self.tx_re.captures(line) {
                let (_, counters) = current.as_mut().ok_or_else(|| orphan(line))?;
                counters.tx_packets = counter(&cap[1])?;
                counters.tx_bytes = counter(&cap[2])?;
            }
        }
        if let Some((name, counters)) = current.take() {
            result.insert(name, counters);
        }
        Ok(result)
    }

    /// Parse the output of `dump-ports` and return the counters of a single port.
    pub fn port_counters(&self, output: &str, port: PortNo) -> Result<PortCounters, RuntimeError> {
        self.parse_port_stats(output)?
            .remove(&port.to_string())
            .ok_or_else(|| RuntimeError::ParseError(format!("port {} is not in the output", port)))
    }

    /// Parse the output of `dump-flows`. Lines without a cookie (like the header) are skipped.
    ///
    /// ```text
    /// OFPST_FLOW reply (OF1.3) (xid=0x2):
    ///  cookie=0x6f70000000000000, duration=3.1s, table=0, n_packets=4, n_bytes=392, priority=1000,in_port=1,dl_src=00:00:00:00:00:01,dl_dst=00:00:00:00:00:02 actions=output:2
    /// ```
    pub fn parse_flow_stats(&self, output: &str) -> Result<Vec<FlowEntry>, RuntimeError> {
        let mut result = Vec::new();
        for line in output.lines() {
            let cookie = match self.cookie_re.captures(line) {
                Some(cap) => u64::from_str_radix(&cap[1], 16)
                    .map_err(|_| RuntimeError::ParseError(format!("invalid cookie: {}", line)))?,
                None => continue,
            };
            let number = |re: &Regex| -> Result<u64, RuntimeError> {
                match re.captures(line) {
                    Some(cap) => counter(&cap[1]),
                    None => Err(RuntimeError::ParseError(format!("incomplete flow: {}", line))),
                }
            };
            result.push(FlowEntry {
                cookie,
                priority: number(&self.priority_re)? as u16,
                n_packets: number(&self.n_packets_re)?,
                n_bytes: number(&self.n_bytes_re)?,
            });
        }
        Ok(result)
    }
}

fn counter(s: &str) -> Result<u64, RuntimeError> {
    if s == "?" {
        return Ok(0);
    }
    s.parse().map_err(|_| RuntimeError::ParseError(format!("invalid counter: {}", s)))
}

fn orphan(line: &str) -> RuntimeError {
    RuntimeError::ParseError(format!("counters without a port: {}", line.trim()))
}

#[cfg(test)]
mod test {
    use super::*;
    use maplit::btreemap;
    use ofpath::flows::{Direction, PathId};
    use std::net::Ipv4Addr;

    const DUMP_PORTS: &str = "OFPST_PORT reply (OF1.3) (xid=0x2): 3 ports
  port LOCAL: rx pkts=0, bytes=0, drop=0, errs=0, frame=0, over=0, crc=0
           tx pkts=0, bytes=0, drop=0, errs=0, coll=0
           duration=101.443s
  port  \"s1-eth1\": rx pkts=10, bytes=980, drop=0, errs=0, frame=0, over=0, crc=0
           tx pkts=9, bytes=882, drop=0, errs=0, coll=0
           duration=101.445s
  port  2: rx pkts=7, bytes=?, drop=0, errs=0, frame=0, over=0, crc=0
           tx pkts=12, bytes=1176, drop=0, errs=0, coll=0
           duration=101.445s
";

    const DUMP_FLOWS: &str = "OFPST_FLOW reply (OF1.3) (xid=0x2):
 cookie=0x6f70000000000002, duration=3.1s, table=0, n_packets=4, n_bytes=392, priority=1000,in_port=1,dl_src=00:00:00:00:00:01,dl_dst=00:00:00:00:00:02 actions=output:2
 cookie=0x6f70000000000003, duration=3.1s, table=0, n_packets=0, n_bytes=0, priority=1000,in_port=2,dl_src=00:00:00:00:00:02,dl_dst=00:00:00:00:00:01 actions=output:1
";

    #[test]
    fn render_ipv4() {
        let rule = FlowRule {
            id: RuleId::new(PathId(0), "s1", Direction::Forward),
            in_port: 1,
            out_port: 3,
            classifier: Classifier::Ipv4 {
                src: Ipv4Addr::new(10, 0, 0, 1),
                dst: Ipv4Addr::new(10, 0, 0, 2),
            },
            priority: 1000,
        };
        assert_eq!(
            render_flow(&rule),
            "cookie=0x6f70000000000000,priority=1000,in_port=1,ip,nw_src=10.0.0.1,\
             nw_dst=10.0.0.2,actions=output:3"
        );
        assert_eq!(rule_match(&rule.id), "cookie=0x6f70000000000000/-1");
        assert_eq!(tagged_match(), "cookie=0x6f70000000000000/0xffff000000000000");
    }

    #[test]
    fn port_stats() {
        let parser = OfctlParser::new().unwrap();
        let stats = parser.parse_port_stats(DUMP_PORTS).unwrap();
        assert_eq!(
            stats,
            btreemap! {
                "LOCAL".to_string() => PortCounters::default(),
                "s1-eth1".to_string() => PortCounters {
                    rx_packets: 10, tx_packets: 9, rx_bytes: 980, tx_bytes: 882
                },
                "2".to_string() => PortCounters {
                    rx_packets: 7, tx_packets: 12, rx_bytes: 0, tx_bytes: 1176
                },
            }
        );
        assert_eq!(parser.port_counters(DUMP_PORTS, 2).unwrap().tx_packets, 12);
        assert!(parser.port_counters(DUMP_PORTS, 3).is_err());
        assert!(parser.parse_port_stats("  tx pkts=0, bytes=0, drop=0").is_err());
        assert!(parser.parse_port_stats("").unwrap().is_empty());
    }

    #[test]
    fn flow_stats() {
        let parser = OfctlParser::new().unwrap();
        let flows = parser.parse_flow_stats(DUMP_FLOWS).unwrap();
        assert_eq!(
            flows,
            vec![
                FlowEntry { cookie: 0x6f70000000000002, priority: 1000, n_packets: 4, n_bytes: 392 },
                FlowEntry { cookie: 0x6f70000000000003, priority: 1000, n_packets: 0, n_bytes: 0 },
            ]
        );
        assert_eq!(RuleId::parse_cookie(flows[0].cookie), Some((PathId(1), Direction::Forward)));
        assert!(parser.parse_flow_stats("NXST_FLOW reply (xid=0x4):\n").unwrap().is_empty());
        assert!(parser.parse_flow_stats(" cookie=0x1, duration=1s, table=0").is_err());
    }
}
