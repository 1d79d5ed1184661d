// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Joining a server chain to a client chain

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::chain::Chain;
use crate::connection::{Connection, Request};
use crate::context::Context;
use crate::errors::ChainError;
use crate::service::{NetworkService, Next};

/// Element of a server chain that carries requests and closes over to a client chain, so that
/// one session spans both sides of the endpoint.
///
/// The connection returned by the client chain is what the rest of the server chain sees.
#[derive(Debug)]
pub struct Connect {
    client: Arc<Chain>,
}

impl Connect {
    #[must_use]
    pub fn new(client: Arc<Chain>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NetworkService for Connect {
    async fn request(
        &self,
        ctx: &Context,
        request: Request,
        next: Next<'_>,
    ) -> Result<Connection, ChainError> {
        let conn = self.client.request(ctx, request).await?;
        match next.request(ctx, Request::new(conn.clone())).await {
            Ok(conn) => Ok(conn),
            Err(e) => {
                let cleanup = ctx.postpone().context();
                match self.client.close(&cleanup, &conn).await {
                    Ok(()) => Err(e),
                    Err(close) => Err(e.with_close_error(close)),
                }
            }
        }
    }

    async fn close(
        &self,
        ctx: &Context,
        conn: &Connection,
        next: Next<'_>,
    ) -> Result<(), ChainError> {
        let client = self.client.close(ctx, conn).await;
        if let Err(e) = &client {
            warn!("Failed to close {conn} on the client chain: {e}");
        }
        next.close(ctx, conn).await.and(client)
    }
}
