// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::module_name_repetitions)]

//! Access control for the connections of the firewall.
//!
//! The configured rules are turned into a pair of ACLs per connection by the [`rules`] module and
//! applied by the [`AclServer`] chain element.

pub mod rules;
mod server;

pub use rules::Direction;
pub use server::AclServer;

use tracectl::{LevelFilter, trace_target};
trace_target!("acl", LevelFilter::INFO);
