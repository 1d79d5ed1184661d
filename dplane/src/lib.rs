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

//! Access to the dataplane engine.
//!
//! The firewall configures a packet-processing engine through a small set of binary API calls
//! ([`api`]). A [`DataplaneApi`] implementation moves the messages, the [`Gateway`] bounds every
//! call by the request context and turns transport failures and engine error codes into a
//! [`DataplaneError`]. The [`sim`] module provides an in-memory engine.

pub mod api;
pub mod gateway;
pub mod sim;
pub mod transport;

pub use gateway::{DataplaneError, Gateway};
pub use transport::{DataplaneApi, TransportError};

use tracectl::{LevelFilter, trace_target};
trace_target!("dplane", LevelFilter::INFO);
