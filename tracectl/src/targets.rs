// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Link-time registry of tracing targets

use crate::LevelFilter;
use linkme::distributed_slice;

/// A tracing target declared with [`trace_target!`](crate::trace_target) or
/// [`custom_target!`](crate::custom_target).
pub struct STarget {
    pub(crate) target: &'static str,
    pub(crate) name: &'static str,
    pub(crate) level: LevelFilter,
    pub(crate) custom: bool,
}

impl STarget {
    #[must_use]
    pub const fn new(
        target: &'static str,
        name: &'static str,
        level: LevelFilter,
        custom: bool,
    ) -> Self {
        Self {
            target,
            name,
            level,
            custom,
        }
    }
}

#[distributed_slice]
pub static TRACING_TARGETS: [STarget];

#[doc(hidden)]
#[macro_export]
macro_rules! trace_target_deps {
    () => {
        use linkme::distributed_slice;
        use $crate::LevelFilter;
        use $crate::targets::{STarget, TRACING_TARGETS};
    };
}

/// Declare the tracing target of the calling module, with a short name and a default level.
///
/// The macro expands into its own const scope so that it can be used several times in a crate
/// without the statics clashing.
#[macro_export]
macro_rules! trace_target {
    ($name:expr, $level:expr) => {
        const _: () = {
            use $crate::trace_target_deps;
            trace_target_deps!();

            #[distributed_slice(TRACING_TARGETS)]
            static TRACE_TGT: STarget = STarget::new(module_path!(), $name, $level, false);
        };
    };
}

/// Declare a tracing target that is not a module path (e.g. a dependency such as `h2`).
#[macro_export]
macro_rules! custom_target {
    ($target:expr, $level:expr) => {
        const _: () = {
            use $crate::trace_target_deps;
            trace_target_deps!();

            #[distributed_slice(TRACING_TARGETS)]
            static TRACE_TGT: STarget = STarget::new($target, $target, $level, true);
        };
    };
}
