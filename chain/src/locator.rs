// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Finding the dataplane interface of a connection

use std::fmt::Debug;

use crate::context::Context;
use crate::metadata::IfIndex;
use crate::service::Side;

/// Resolves the dataplane interface an earlier element created for the connection being
/// processed. Elements configuring an interface never own it: they only look it up.
pub trait InterfaceLocator: Debug + Send + Sync {
    fn lookup(&self, ctx: &Context, side: Side) -> Option<IfIndex>;
}

/// Looks the interface up in the per-connection metadata of the context
#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataLocator;

impl InterfaceLocator for MetadataLocator {
    fn lookup(&self, ctx: &Context, side: Side) -> Option<IfIndex> {
        ctx.metadata()?.load_ifindex(side)
    }
}
