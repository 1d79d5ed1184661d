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
#![deny(rustdoc::all)]
#![allow(clippy::module_name_repetitions)]

//! Network Address Translation (NAT) for the connections of the firewall
//!
//! This package implements the chain elements enabling the NAT44 feature of the dataplane on the
//! interface of each connection:
//!
//! - [`NatServer`] gives the interface the role matching the chain side it runs on: `inside` on
//!   a server chain, `outside` on a client chain;
//! - [`NatClient`] always makes the interface `outside`.
//!
//! The plugin itself and the pool of translated addresses are set up once for the process with
//! [`NatSetup`].
//!
//! # Limitations
//!
//! - Only NAT44 is supported.
//! - The per-connection state only tracks whether the feature was enabled: sessions and address
//!   allocation are left to the dataplane.

mod client;
mod common;
mod server;
mod setup;

#[cfg(test)]
mod test_utils;

pub use client::NatClient;
pub use common::{NatInterfaceState, role_for_side};
pub use dplane::api::NatRole;
pub use server::NatServer;
pub use setup::{NatSetup, NatSetupError};

use tracectl::{LevelFilter, trace_target};
trace_target!("nat", LevelFilter::INFO);
