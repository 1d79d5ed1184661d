// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Simple chain elements

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use crate::connection::{Connection, Request};
use crate::context::Context;
use crate::errors::ChainError;
use crate::service::{NetworkService, Next};

/// Element that does nothing but forward
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

#[async_trait]
impl NetworkService for Passthrough {
    async fn request(
        &self,
        ctx: &Context,
        request: Request,
        next: Next<'_>,
    ) -> Result<Connection, ChainError> {
        next.request(ctx, request).await
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

/// Element that logs the requests and closes crossing it, and their outcome.
#[derive(Debug)]
pub struct Inspect {
    name: String,
    requests: AtomicU64,
    closes: AtomicU64,
}

impl Inspect {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            requests: AtomicU64::new(0),
            closes: AtomicU64::new(0),
        }
    }
    /// Number of requests seen
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
    /// Number of closes seen
    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl NetworkService for Inspect {
    async fn request(
        &self,
        ctx: &Context,
        request: Request,
        next: Next<'_>,
    ) -> Result<Connection, ChainError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        debug!(
            "{}: request for {} on the {} side",
            self.name,
            request.connection(),
            next.side()
        );
        let result = next.request(ctx, request).await;
        match &result {
            Ok(conn) => debug!("{}: established {conn}", self.name),
            Err(e) => info!("{}: request failed: {e}", self.name),
        }
        result
    }

    async fn close(
        &self,
        ctx: &Context,
        conn: &Connection,
        next: Next<'_>,
    ) -> Result<(), ChainError> {
        self.closes.fetch_add(1, Ordering::Relaxed);
        debug!("{}: close of {conn} on the {} side", self.name, next.side());
        let result = next.close(ctx, conn).await;
        if let Err(e) = &result {
            info!("{}: close failed: {e}", self.name);
        }
        result
    }
}
