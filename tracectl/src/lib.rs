// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Crate to control tracing dynamically at runtime.
//!
//! Every crate of the firewall declares its tracing target once with [`trace_target!`]. The
//! declarations are collected at link time, so the [`TracingControl`] knows about all of them
//! before the first event is emitted and can change their levels at runtime.

pub mod control;
pub mod targets;

// re-exports
pub use control::{TracingControl, TracingError, get_trace_ctl};
pub use tracing_subscriber::filter::LevelFilter;
