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

//! Configuration of the runtime system

use crate::RuntimeError;
use ofpath::session::SessionOptions;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// # Runtime Configuration
///
/// Read from a JSON file, where every field is optional:
///
/// ```json
/// {
///   "ofctl": "/usr/bin/ovs-ofctl",
///   "use_sudo": true,
///   "openflow_version": "OpenFlow13",
///   "command_timeout_ms": 2000,
///   "batch_timeout_ms": 10000,
///   "parallelism": 4
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Path to the `ovs-ofctl` binary
    pub ofctl: String,
    /// Call `ovs-ofctl` through `sudo`
    pub use_sudo: bool,
    /// OpenFlow version passed with `-O`
    pub openflow_version: String,
    /// Timeout of a single `ovs-ofctl` call
    pub command_timeout_ms: u64,
    /// Timeout of a whole batch of rules
    pub batch_timeout_ms: u64,
    /// Number of parallel `ovs-ofctl` calls. Uses the number of CPUs if not set.
    pub parallelism: Option<usize>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            ofctl: "ovs-ofctl".to_string(),
            use_sudo: true,
            openflow_version: "OpenFlow13".to_string(),
            command_timeout_ms: 2_000,
            batch_timeout_ms: 10_000,
            parallelism: None,
        }
    }
}

impl RuntimeConfig {
    /// Parse the configuration from a JSON string and validate it
    pub fn from_json(json: &str) -> Result<Self, RuntimeError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read the configuration from a JSON file
    pub fn from_file(filename: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        Self::from_json(&std::fs::read_to_string(filename)?)
    }

    /// Check that all values are usable
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.ofctl.trim().is_empty() {
            return Err(RuntimeError::InvalidConfig("ofctl must not be empty".to_string()));
        }
        if self.command_timeout_ms == 0 || self.batch_timeout_ms == 0 {
            return Err(RuntimeError::InvalidConfig("timeouts must be positive".to_string()));
        }
        if self.parallelism == Some(0) {
            return Err(RuntimeError::InvalidConfig("parallelism must be positive".to_string()));
        }
        Ok(())
    }

    /// Timeout of a single `ovs-ofctl` call
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Options for the session manager
    pub fn session_options(&self) -> SessionOptions {
        let defaults = SessionOptions::default();
        SessionOptions {
            batch_timeout: Duration::from_millis(self.batch_timeout_ms),
            parallelism: self.parallelism.unwrap_or(defaults.parallelism),
        }
    }
}
