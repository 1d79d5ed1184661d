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

//! # Chain building blocks
//!
//! A connection is established by sending a request through a [`Chain`] of elements, each
//! implementing [`NetworkService`], and released by sending a close through the same chain.
//! Every element receives a [`Next`] cursor and decides when the rest of the chain runs.
//!
//! Besides the dispatch itself, this crate provides what elements configuring per-connection
//! dataplane state have in common:
//!
//! - a request-scoped [`Context`] with a deadline, a cancellation signal and per-connection
//!   [`Metadata`], which can be [postponed](Context::postpone) to run cleanups;
//! - an [`InterfaceLocator`] to find the interface an earlier element created;
//! - a [`ConnTracker`] remembering the resources created for each connection;
//! - the [`ChainError`] type.

mod chain;
pub mod connect;
pub mod connection;
pub mod context;
pub mod errors;
pub mod locator;
pub mod metadata;
pub mod sample;
pub mod service;
pub mod tracker;

#[cfg(test)]
mod test_utils;

pub use chain::{Chain, ChainBuildError};
pub use connection::{ConnId, Connection, Request};
pub use context::{Context, ContextError, POSTPONE_GRACE, Postponed};
pub use errors::{BoxError, ChainError};
pub use locator::{InterfaceLocator, MetadataLocator};
pub use metadata::{IfIndex, Metadata, MetadataServer};
pub use service::{NetworkService, Next, Side};
pub use tracker::{Claim, ConnTracker, Reservation, TrackState};

use tracectl::{LevelFilter, trace_target};
trace_target!("chain", LevelFilter::INFO);
