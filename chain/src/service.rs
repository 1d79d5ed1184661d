// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The [`NetworkService`] trait implemented by chain elements, and the [`Next`] cursor used to
//! call the rest of the chain.

use async_trait::async_trait;
use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use crate::connection::{Connection, Request};
use crate::context::Context;
use crate::errors::ChainError;

/// The side of a session a chain runs on.
///
/// A server chain handles requests coming from the initiator of a session, a client chain
/// forwards them towards the next endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Side {
    Client,
    Server,
}

impl Side {
    #[must_use]
    pub fn is_client(self) -> bool {
        self == Side::Client
    }
}

/// A chain element.
///
/// Elements decide where in their own processing the rest of the chain runs, by calling
/// [`Next::request`] / [`Next::close`]. An element must always forward a `close`, even when its
/// own teardown failed.
#[async_trait]
pub trait NetworkService: Any + Send + Sync {
    /// Establish or refresh a connection.
    async fn request(
        &self,
        ctx: &Context,
        request: Request,
        next: Next<'_>,
    ) -> Result<Connection, ChainError>;

    /// Release a connection.
    async fn close(
        &self,
        ctx: &Context,
        conn: &Connection,
        next: Next<'_>,
    ) -> Result<(), ChainError>;
}

/// Cursor over the elements that follow the current one
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stages: &'a [Arc<dyn NetworkService>],
    side: Side,
}

impl Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.stages.len())
            .field("side", &self.side)
            .finish()
    }
}

impl<'a> Next<'a> {
    pub(crate) fn new(stages: &'a [Arc<dyn NetworkService>], side: Side) -> Self {
        Self { stages, side }
    }

    /// A cursor past the last element: requests return their connection, closes succeed.
    #[must_use]
    pub fn end(side: Side) -> Next<'static> {
        Next { stages: &[], side }
    }

    /// The side of the chain being traversed
    #[must_use]
    pub fn side(&self) -> Side {
        self.side
    }

    /// Number of elements left
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.stages.len()
    }

    /// Run the request through the rest of the chain
    ///
    /// # Errors
    ///
    /// Returns the error of the first element that fails.
    pub async fn request(self, ctx: &Context, request: Request) -> Result<Connection, ChainError> {
        match self.stages.split_first() {
            Some((stage, rest)) => stage.request(ctx, request, Next::new(rest, self.side)).await,
            None => Ok(request.into_connection()),
        }
    }

    /// Run the close through the rest of the chain
    ///
    /// # Errors
    ///
    /// Returns whatever the rest of the chain reports.
    pub async fn close(self, ctx: &Context, conn: &Connection) -> Result<(), ChainError> {
        match self.stages.split_first() {
            Some((stage, rest)) => stage.close(ctx, conn, Next::new(rest, self.side)).await,
            None => Ok(()),
        }
    }
}
