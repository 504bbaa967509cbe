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

//! # Open vSwitch Connection
//!
//! Implements the [`ControlPlane`] by calling `ovs-ofctl` for every operation. Each call is a
//! separate process, which is polled until it exits or the command timeout is reached. This allows
//! the session manager to install many rules in parallel, since every worker thread owns its own
//! process.

use crate::config::RuntimeConfig;
use crate::ofctl::{render_flow, rule_match, tagged_match, OfctlParser};
use crate::RuntimeError;

use ofpath::control::{ControlError, ControlPlane, FlowStats, PortCounters};
use ofpath::flows::{FlowRule, RuleId};
use ofpath::topology::PortNo;

use log::*;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread::{self, sleep, JoinHandle};
use std::time::{Duration, Instant};

/// Poll interval while waiting for `ovs-ofctl` to exit
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Connection to the Open vSwitch bridges of the local machine.
#[derive(Debug, Clone)]
pub struct OvsConnection {
    config: RuntimeConfig,
    parser: OfctlParser,
}

impl OvsConnection {
    /// Create a new connection. The configuration is validated, but `ovs-ofctl` is not called.
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        config.validate()?;
        Ok(Self { config, parser: OfctlParser::new()? })
    }

    /// Returns the configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Remove all rules from the switch that were installed by this crate, including rules of
    /// earlier runs. Rules of other controllers stay untouched.
    pub fn clear_tagged(&self, switch: &str) -> Result<(), ControlError> {
        info!("Removing all path rules from {}", switch);
        self.ofctl(switch, "del-flows", &[tagged_match()]).map(|_| ())
    }

    /// Run `ovs-ofctl <command> <switch> <args>` and return its standard output.
    fn ofctl(&self, switch: &str, command: &str, args: &[String]) -> Result<String, ControlError> {
        let mut cmd = if self.config.use_sudo {
            let mut cmd = Command::new("sudo");
            cmd.arg(&self.config.ofctl);
            cmd
        } else {
            Command::new(&self.config.ofctl)
        };
        cmd.arg("-O")
            .arg(&self.config.openflow_version)
            .arg(command)
            .arg(switch)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        trace!("{:?}", cmd);

        let mut child = cmd
            .spawn()
            .map_err(|e| ControlError::channel(switch, format!("cannot call ovs-ofctl: {}", e)))?;

        // read both pipes in the background, such that a large output cannot block the child
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match wait_deadline(&mut child, self.config.command_timeout()) {
            Ok(Some(status)) => status,
            Ok(None) => {
                warn!("ovs-ofctl {} {} did not finish in time!", command, switch);
                child.kill().ok();
                child.wait().ok();
                return Err(ControlError::channel(
                    switch,
                    format!("ovs-ofctl {} timed out", command),
                ));
            }
            Err(e) => return Err(ControlError::channel(switch, e.to_string())),
        };

        let stdout = collect(stdout);
        let stderr = collect(stderr);
        if status.success() {
            Ok(stdout)
        } else {
            let reason = match stderr.trim() {
                "" => format!("ovs-ofctl {} exited with {}", command, status),
                msg => msg.to_string(),
            };
            debug!("ovs-ofctl {} {} failed: {}", command, switch, reason);
            Err(ControlError::channel(switch, reason))
        }
    }
}

impl ControlPlane for OvsConnection {
    fn install(&self, rule: &FlowRule) -> Result<(), ControlError> {
        debug!("install {}", rule);
        self.ofctl(rule.switch(), "add-flow", &[render_flow(rule)]).map(|_| ())
    }

    fn remove(&self, rule: &RuleId) -> Result<(), ControlError> {
        debug!("remove {}", rule);
        self.ofctl(&rule.switch, "del-flows", &[rule_match(rule)]).map(|_| ())
    }

    fn read_counters(&self, switch: &str, port: PortNo) -> Result<PortCounters, ControlError> {
        let unavailable = |reason: String| ControlError::CounterUnavailable {
            switch: switch.to_string(),
            port,
            reason,
        };
        let output = self.ofctl(switch, "dump-ports", &[port.to_string()]).map_err(|e| match e {
            ControlError::ControlChannel { reason, .. } => unavailable(reason),
            e => e,
        })?;
        self.parser.port_counters(&output, port).map_err(|e| unavailable(e.to_string()))
    }

    fn read_flow_stats(&self, rule: &RuleId) -> Result<Option<FlowStats>, ControlError> {
        let output = self.ofctl(&rule.switch, "dump-flows", &[rule_match(rule)])?;
        let entries = self
            .parser
            .parse_flow_stats(&output)
            .map_err(|e| ControlError::channel(rule.switch.as_str(), e.to_string()))?;
        let cookie = rule.cookie();
        Ok(entries.into_iter().find(|e| e.cookie == cookie).map(|e| FlowStats {
            rule: rule.clone(),
            n_packets: e.n_packets,
            n_bytes: e.n_bytes,
        }))
    }
}

/// Poll the child until it exits, or until the timeout is reached. Returns `None` on timeout.
fn wait_deadline(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = String::new();
            if let Err(e) = pipe.read_to_string(&mut buf) {
                warn!("Cannot read the output of ovs-ofctl: {}", e);
            }
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

#[cfg(all(test, unix))]
mod test {
    use super::*;
    use ofpath::flows::{Classifier, Direction, PathId};
    use ofpath::topology::MacAddr;

    fn connection(ofctl: &str) -> OvsConnection {
        OvsConnection::new(RuntimeConfig {
            ofctl: ofctl.to_string(),
            use_sudo: false,
            ..Default::default()
        })
        .unwrap()
    }

    fn rule() -> FlowRule {
        FlowRule {
            id: RuleId::new(PathId(0), "s1", Direction::Forward),
            in_port: 1,
            out_port: 2,
            classifier: Classifier::Ethernet {
                src: MacAddr([0, 0, 0, 0, 0, 1]),
                dst: MacAddr([0, 0, 0, 0, 0, 2]),
            },
            priority: 1000,
        }
    }

    #[test]
    fn successful_call() {
        // `echo` accepts any argument and exits successfully
        let conn = connection("echo");
        let output = conn.ofctl("s1", "add-flow", &[render_flow(&rule())]).unwrap();
        assert!(output.starts_with("-O OpenFlow13 add-flow s1 cookie=0x6f70000000000000"));
        assert!(conn.install(&rule()).is_ok());
        assert!(conn.remove(&rule().id).is_ok());
        assert!(conn.clear_tagged("s1").is_ok());
        // the echoed arguments contain no flow entry with counters
        assert!(conn.read_flow_stats(&rule().id).is_err());
    }

    #[test]
    fn failing_call() {
        let conn = connection("false");
        assert!(matches!(
            conn.install(&rule()),
            Err(ControlError::ControlChannel { switch, .. }) if switch == "s1"
        ));
        assert!(matches!(
            conn.read_counters("s1", 1),
            Err(ControlError::CounterUnavailable { port: 1, .. })
        ));
    }

    #[test]
    fn missing_binary() {
        let conn = connection("/nonexistent/ovs-ofctl");
        let err = conn.install(&rule()).unwrap_err();
        assert!(err.to_string().contains("cannot call ovs-ofctl"));
    }

    #[test]
    fn unparsable_counters() {
        let conn = connection("echo");
        assert!(matches!(
            conn.read_counters("s1", 1),
            Err(ControlError::CounterUnavailable { .. })
        ));
    }

    #[test]
    fn command_timeout() {
        use std::os::unix::fs::PermissionsExt;

        // stand-in for an ovs-ofctl that never answers
        let script =
            std::env::temp_dir().join(format!("ofpath-hanging-{}.sh", std::process::id()));
        std::fs::write(&script, "#!/bin/sh\nexec sleep 5\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let conn = OvsConnection::new(RuntimeConfig {
            ofctl: script.to_string_lossy().to_string(),
            use_sudo: false,
            command_timeout_ms: 200,
            ..Default::default()
        })
        .unwrap();

        let start = Instant::now();
        let result = conn.install(&rule());
        let elapsed = start.elapsed();
        std::fs::remove_file(&script).ok();

        assert_eq!(
            result,
            Err(ControlError::ControlChannel {
                switch: "s1".to_string(),
                reason: "ovs-ofctl add-flow timed out".to_string()
            })
        );
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(3));
    }

    #[test]
    fn invalid_config() {
        assert!(OvsConnection::new(RuntimeConfig { ofctl: "".to_string(), ..Default::default() })
            .is_err());
    }
}
