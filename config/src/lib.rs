// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Configuration of the firewall: the process parameters, and the ACL rules read from a YAML
//! file at startup.

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::missing_errors_doc)]

pub mod errors;
pub mod firewall;
pub mod rules;

pub use errors::{ConfigError, ConfigResult}; // re-export
pub use firewall::{FirewallConfig, FirewallConfigBuilder}; // re-export
pub use rules::{DEFAULT_ACL_CONFIG_PATH, load_acl_rules, parse_acl_rules, read_acl_rules}; // re-export

use tracectl::{LevelFilter, trace_target};
trace_target!("config", LevelFilter::INFO);
