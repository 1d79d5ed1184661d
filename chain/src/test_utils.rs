// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Elements used to exercise chains in tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::connection::{Connection, Request};
use crate::context::Context;
use crate::errors::ChainError;
use crate::metadata::IfIndex;
use crate::service::{NetworkService, Next};

pub(crate) type Journal = Arc<Mutex<Vec<String>>>;

/// Records when it sees requests and closes
pub(crate) struct Recorder {
    name: &'static str,
    journal: Journal,
}

impl Recorder {
    pub(crate) fn journal() -> Journal {
        Arc::new(Mutex::new(Vec::new()))
    }
    pub(crate) fn new(name: &'static str, journal: &Journal) -> Self {
        Self {
            name,
            journal: journal.clone(),
        }
    }
    fn record(&self, what: &str) {
        self.journal.lock().push(format!("{}:{what}", self.name));
    }
}

#[async_trait]
impl NetworkService for Recorder {
    async fn request(
        &self,
        ctx: &Context,
        request: Request,
        next: Next<'_>,
    ) -> Result<Connection, ChainError> {
        self.record("request:before");
        let conn = next.request(ctx, request).await?;
        self.record("request:after");
        Ok(conn)
    }

    async fn close(
        &self,
        ctx: &Context,
        conn: &Connection,
        next: Next<'_>,
    ) -> Result<(), ChainError> {
        self.record("close");
        next.close(ctx, conn).await
    }
}

/// Refuses every request, forwards closes
pub(crate) struct Refuse;

#[async_trait]
impl NetworkService for Refuse {
    async fn request(
        &self,
        _ctx: &Context,
        _request: Request,
        _next: Next<'_>,
    ) -> Result<Connection, ChainError> {
        Err(ChainError::Refused("refused".to_string()))
    }

    async fn close(
        &self,
        ctx: &Context,
        conn: &Connection,
        next: Next<'_>,
    ) -> Result<(), ChainError> {
        next.close(ctx, conn).await
    }
}

/// Stores an interface in the metadata for the side of the chain
pub(crate) struct StoreIfIndex(pub(crate) IfIndex);

#[async_trait]
impl NetworkService for StoreIfIndex {
    async fn request(
        &self,
        ctx: &Context,
        request: Request,
        next: Next<'_>,
    ) -> Result<Connection, ChainError> {
        if let Some(md) = ctx.metadata() {
            md.store_ifindex(next.side(), self.0);
        }
        next.request(ctx, request).await
    }

    async fn close(
        &self,
        ctx: &Context,
        conn: &Connection,
        next: Next<'_>,
    ) -> Result<(), ChainError> {
        if let Some(md) = ctx.metadata() {
            md.delete_ifindex(next.side());
        }
        next.close(ctx, conn).await
    }
}
