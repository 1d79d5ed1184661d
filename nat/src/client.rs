// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The NAT element of client chains

use async_trait::async_trait;
use chain::{
    ChainError, ConnId, Connection, Context, InterfaceLocator, MetadataLocator, NetworkService,
    Next, Request, TrackState,
};
use dplane::Gateway;
use dplane::api::NatRole;
use std::sync::Arc;

use crate::common::{NatInterfaceState, NatInterfaces};

/// Chain element enabling address translation on the interface of every connection, always as
/// the outside interface: a client chain leads towards the next endpoint of the session.
#[derive(Debug)]
pub struct NatClient {
    interfaces: NatInterfaces,
}

impl NatClient {
    /// An element looking interfaces up in the connection metadata
    #[must_use]
    pub fn new(gateway: Gateway) -> Self {
        Self::with_locator(gateway, Arc::new(MetadataLocator))
    }

    #[must_use]
    pub fn with_locator(gateway: Gateway, locator: Arc<dyn InterfaceLocator>) -> Self {
        Self {
            interfaces: NatInterfaces::new(gateway, locator),
        }
    }

    #[must_use]
    pub fn state(&self, conn: &ConnId) -> TrackState {
        self.interfaces.state(conn)
    }

    pub async fn configured(&self, conn: &ConnId) -> Option<NatInterfaceState> {
        self.interfaces.get(conn).await
    }
}

#[async_trait]
impl NetworkService for NatClient {
    async fn request(
        &self,
        ctx: &Context,
        request: Request,
        next: Next<'_>,
    ) -> Result<Connection, ChainError> {
        self.interfaces
            .request(ctx, request, next, |_| NatRole::Outside)
            .await
    }

    async fn close(
        &self,
        ctx: &Context,
        conn: &Connection,
        next: Next<'_>,
    ) -> Result<(), ChainError> {
        self.interfaces.close(ctx, conn, next).await
    }
}
