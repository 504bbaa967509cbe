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

//! # Runtime System
//!
//! This crate connects the path planner to a running network of Open vSwitch bridges, for instance
//! one that is emulated by Mininet. The [`OvsConnection`](ovs_conn::OvsConnection) implements the
//! [`ControlPlane`](ofpath::control::ControlPlane) by calling `ovs-ofctl`, and the
//! [`RuntimeConfig`](config::RuntimeConfig) describes how it is called.

#![deny(missing_docs, missing_debug_implementations)]

pub mod config;
pub mod ofctl;
pub mod ovs_conn;

use thiserror::Error;

/// Errors of the runtime system
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The configuration file could not be read
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),
    /// The configuration file could not be parsed
    #[error("JSON Error: {0}")]
    JsonError(#[from] serde_json::Error),
    /// A regular expression could not be compiled
    #[error("Regex Error: {0}")]
    RegexError(#[from] regex::Error),
    /// The configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// The output of `ovs-ofctl` could not be parsed
    #[error("Cannot parse the output of ovs-ofctl: {0}")]
    ParseError(String),
}
