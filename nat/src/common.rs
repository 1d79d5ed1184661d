// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Lifecycle shared by the NAT chain elements

use chain::{
    ChainError, Claim, ConnId, ConnTracker, Connection, Context, IfIndex, InterfaceLocator, Next,
    Request, Side, TrackState,
};
use dplane::Gateway;
use dplane::api::NatRole;
use std::sync::Arc;
#[allow(unused)]
use tracing::{debug, error, info, warn};

/// The role given to the interface of a chain side: a server chain faces the clients of the
/// network service, which are on the private side.
#[must_use]
pub fn role_for_side(side: Side) -> NatRole {
    match side {
        Side::Server => NatRole::Inside,
        Side::Client => NatRole::Outside,
    }
}

/// What was configured for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NatInterfaceState {
    pub ifindex: IfIndex,
    pub role: NatRole,
    pub configured: bool,
}

/// Enables address translation on the interface of each connection, once, and disables it
/// when the connection is closed.
#[derive(Debug)]
pub(crate) struct NatInterfaces {
    gateway: Gateway,
    locator: Arc<dyn InterfaceLocator>,
    states: ConnTracker<NatInterfaceState>,
}

impl NatInterfaces {
    pub(crate) fn new(gateway: Gateway, locator: Arc<dyn InterfaceLocator>) -> Self {
        Self {
            gateway,
            locator,
            states: ConnTracker::new(),
        }
    }

    pub(crate) fn state(&self, conn: &ConnId) -> TrackState {
        self.states.state(conn)
    }

    pub(crate) async fn get(&self, conn: &ConnId) -> Option<NatInterfaceState> {
        self.states.load(conn).await
    }

    pub(crate) async fn request(
        &self,
        ctx: &Context,
        request: Request,
        next: Next<'_>,
        role: impl FnOnce(Side) -> NatRole + Send,
    ) -> Result<Connection, ChainError> {
        let postponed = ctx.postpone();
        let conn = next.request(ctx, request).await?;

        let reservation = match self.states.claim(conn.id()).await {
            Claim::Applied(state) => {
                debug!(conn = %conn.id(), ifindex = %state.ifindex, role = %state.role, "NAT already configured");
                return Ok(conn);
            }
            Claim::Vacant(reservation) => reservation,
        };

        let side = next.side();
        let role = role(side);
        let result = match self.locator.lookup(ctx, side) {
            None => Err(ChainError::InterfaceNotFound {
                conn: conn.id().clone(),
                side,
            }),
            Some(ifindex) => self
                .gateway
                .enable_nat_interface(ctx, ifindex, role)
                .await
                .map(|()| ifindex)
                .map_err(ChainError::from),
        };

        match result {
            Ok(ifindex) => {
                let state = NatInterfaceState {
                    ifindex,
                    role,
                    configured: true,
                };
                reservation.commit(state);
                info!(conn = %conn.id(), %ifindex, %role, "enabled NAT");
                Ok(conn)
            }
            Err(e) => {
                // nothing was enabled: only the rest of the chain is undone, before concurrent
                // requests for the connection may try again
                warn!(conn = %conn.id(), "failed to configure NAT: {e}");
                let closed = next.close(&postponed.context(), &conn).await;
                reservation.abandon();
                match closed {
                    Ok(()) => Err(e),
                    Err(close) => Err(e.with_close_error(close)),
                }
            }
        }
    }

    pub(crate) async fn close(
        &self,
        ctx: &Context,
        conn: &Connection,
        next: Next<'_>,
    ) -> Result<(), ChainError> {
        if let Some(state) = self.states.load_and_delete(conn.id()).await {
            if state.configured {
                match self
                    .gateway
                    .disable_nat_interface(ctx, state.ifindex, state.role)
                    .await
                {
                    Ok(()) => {
                        info!(conn = %conn.id(), ifindex = %state.ifindex, role = %state.role, "disabled NAT");
                    }
                    Err(e) => {
                        error!(conn = %conn.id(), ifindex = %state.ifindex, role = %state.role, "failed to disable NAT: {e}");
                    }
                }
            }
        }
        next.close(ctx, conn).await
    }
}
