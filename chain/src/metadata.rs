// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-connection metadata shared by the elements of a chain, and the element that attaches it
//! to the [`Context`].

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt::Display;
use std::sync::Arc;
#[allow(unused)]
use tracing::{debug, trace};

use crate::connection::{ConnId, Connection, Request};
use crate::context::Context;
use crate::errors::ChainError;
use crate::service::{NetworkService, Next, Side};

/// Handle of a dataplane interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IfIndex(pub u32);

impl IfIndex {
    #[must_use]
    pub fn to_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for IfIndex {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl Display for IfIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Values an element stores for the elements that come after it, for one connection.
///
/// Client and server chains have separate slots, since a session crossing an endpoint uses one
/// interface on each side.
#[derive(Debug, Default)]
pub struct Metadata {
    ifindex: RwLock<[Option<IfIndex>; 2]>,
}

fn slot(side: Side) -> usize {
    match side {
        Side::Client => 0,
        Side::Server => 1,
    }
}

impl Metadata {
    pub fn store_ifindex(&self, side: Side, ifindex: IfIndex) {
        self.ifindex.write()[slot(side)] = Some(ifindex);
    }
    #[must_use]
    pub fn load_ifindex(&self, side: Side) -> Option<IfIndex> {
        self.ifindex.read()[slot(side)]
    }
    /// Get the interface of a side, or store the one built by `create` if there is none. Tells
    /// whether the interface was created.
    pub fn load_or_store_ifindex(
        &self,
        side: Side,
        create: impl FnOnce() -> IfIndex,
    ) -> (IfIndex, bool) {
        let mut slots = self.ifindex.write();
        match slots[slot(side)] {
            Some(ifindex) => (ifindex, false),
            None => {
                let ifindex = create();
                slots[slot(side)] = Some(ifindex);
                (ifindex, true)
            }
        }
    }
    /// Forget the interface of a side, returning it
    pub fn delete_ifindex(&self, side: Side) -> Option<IfIndex> {
        self.ifindex.write()[slot(side)].take()
    }
}

/// Chain element keeping one [`Metadata`] per connection and attaching it to the context of every
/// request and close. It must be placed before any element relying on metadata.
#[derive(Debug, Default)]
pub struct MetadataServer {
    connections: DashMap<ConnId, Arc<Metadata>>,
}

impl MetadataServer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connections with metadata
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    #[must_use]
    pub fn get(&self, conn: &ConnId) -> Option<Arc<Metadata>> {
        self.connections.get(conn).map(|md| md.value().clone())
    }
}

#[async_trait]
impl NetworkService for MetadataServer {
    async fn request(
        &self,
        ctx: &Context,
        request: Request,
        next: Next<'_>,
    ) -> Result<Connection, ChainError> {
        let id = request.connection().id().clone();
        let mut created = false;
        let metadata = self
            .connections
            .entry(id.clone())
            .or_insert_with(|| {
                created = true;
                Arc::new(Metadata::default())
            })
            .value()
            .clone();
        if created {
            trace!(conn = %id, "created metadata");
        }

        let result = next.request(&ctx.with_metadata(metadata), request).await;
        if result.is_err() && created {
            // a failed first request leaves nothing behind to be closed
            self.connections.remove(&id);
        }
        result
    }

    async fn close(
        &self,
        ctx: &Context,
        conn: &Connection,
        next: Next<'_>,
    ) -> Result<(), ChainError> {
        let metadata = self.get(conn.id()).unwrap_or_default();
        let result = next.close(&ctx.with_metadata(metadata), conn).await;
        if self.connections.remove(conn.id()).is_some() {
            trace!(conn = %conn.id(), "deleted metadata");
        }
        result
    }
}
