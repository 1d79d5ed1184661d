// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![allow(clippy::missing_errors_doc)]

use crate::connection::{Connection, Request};
use crate::context::Context;
use crate::errors::ChainError;
use crate::service::{NetworkService, Next, Side};
use ordermap::OrderMap;
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

/// Errors when assembling a [`Chain`]
#[derive(Debug, thiserror::Error)]
pub enum ChainBuildError {
    #[error("Duplicate stage name: {0}")]
    DuplicateStageName(String),
}

/// An ordered list of chain elements for one side of a session.
///
/// A request (or close) enters the first stage, which decides when to hand it to the next one
/// through the [`Next`] cursor it receives.
///
/// # Example
///
/// ```
/// use firewall_chain::sample::{Inspect, Passthrough};
/// use firewall_chain::{Chain, Side};
///
/// let chain = Chain::new("endpoint", Side::Server)
///     .add_stage(Inspect::new("in"))
///     .add_stage(Passthrough);
/// assert_eq!(chain.len(), 2);
/// ```
pub struct Chain {
    name: String,
    side: Side,
    names: OrderMap<String, usize>,
    stages: Vec<Arc<dyn NetworkService>>,
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("name", &self.name)
            .field("side", &self.side)
            .field("stages", &self.names.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Chain {
    /// Create an empty [`Chain`].
    #[must_use]
    pub fn new(name: &str, side: Side) -> Self {
        Self {
            name: name.to_owned(),
            side,
            names: OrderMap::new(),
            stages: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn side(&self) -> Side {
        self.side
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Names of the stages, in processing order
    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    /// Append an element under a generated name.
    #[must_use]
    pub fn add_stage<S: NetworkService>(self, stage: S) -> Self {
        self.add_shared_stage(Arc::new(stage))
    }

    /// Append an element that is also referenced elsewhere, under a generated name.
    #[must_use]
    pub fn add_shared_stage(mut self, stage: Arc<dyn NetworkService>) -> Self {
        let mut position = self.stages.len();
        let mut name = format!("stage-{position}");
        while self.names.contains_key(&name) {
            position += 1;
            name = format!("stage-{position}");
        }
        self.internal_add_stage(name, stage);
        self
    }

    /// Append an element under the given name.
    pub fn add_stage_with_name<S: NetworkService>(
        &mut self,
        name: &str,
        stage: S,
    ) -> Result<&mut Self, ChainBuildError> {
        self.add_shared_stage_with_name(name, Arc::new(stage))
    }

    /// Append an element that is also referenced elsewhere, under the given name.
    pub fn add_shared_stage_with_name(
        &mut self,
        name: &str,
        stage: Arc<dyn NetworkService>,
    ) -> Result<&mut Self, ChainBuildError> {
        if self.names.contains_key(name) {
            return Err(ChainBuildError::DuplicateStageName(name.to_owned()));
        }
        self.internal_add_stage(name.to_owned(), stage);
        Ok(self)
    }

    fn internal_add_stage(&mut self, name: String, stage: Arc<dyn NetworkService>) {
        self.names.insert(name, self.stages.len());
        self.stages.push(stage);
    }

    /// Get an element of the chain by name, if it is of type `T`.
    #[must_use]
    pub fn get_stage<T: NetworkService>(&self, name: &str) -> Option<&T> {
        let index = *self.names.get(name)?;
        let stage: &dyn Any = &*self.stages[index];
        stage.downcast_ref::<T>()
    }

    /// A cursor at the head of the chain
    #[must_use]
    pub fn head(&self) -> Next<'_> {
        Next::new(&self.stages, self.side)
    }

    /// Run a request through the whole chain
    pub async fn request(&self, ctx: &Context, request: Request) -> Result<Connection, ChainError> {
        debug!(
            chain = self.name,
            conn = %request.connection().id(),
            "request"
        );
        self.head().request(ctx, request).await
    }

    /// Run a close through the whole chain
    pub async fn close(&self, ctx: &Context, conn: &Connection) -> Result<(), ChainError> {
        debug!(chain = self.name, conn = %conn.id(), "close");
        self.head().close(ctx, conn).await
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod test {
    use super::{Chain, ChainBuildError};
    use crate::connection::{Connection, Request};
    use crate::context::Context;
    use crate::sample::{Inspect, Passthrough};
    use crate::service::Side;
    use crate::test_utils::{Recorder, Refuse};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[tokio::test]
    async fn stages_run_in_order() {
        let journal = Recorder::journal();
        let chain = Chain::new("test", Side::Server)
            .add_stage(Recorder::new("a", &journal))
            .add_stage(Passthrough)
            .add_stage(Recorder::new("b", &journal));

        let conn = chain
            .request(&Context::background(), Request::new(Connection::new("c1", "fw")))
            .await
            .unwrap();
        assert_eq!(conn.id().as_str(), "c1");
        chain.close(&Context::background(), &conn).await.unwrap();

        assert_eq!(
            *journal.lock(),
            vec![
                "a:request:before",
                "b:request:before",
                "b:request:after",
                "a:request:after",
                "a:close",
                "b:close",
            ]
        );
    }

    #[tokio::test]
    async fn failure_stops_the_request() {
        let journal = Recorder::journal();
        let chain = Chain::new("test", Side::Client)
            .add_stage(Recorder::new("a", &journal))
            .add_stage(Refuse)
            .add_stage(Recorder::new("b", &journal));

        let result = chain
            .request(&Context::background(), Request::new(Connection::new("c1", "fw")))
            .await;
        assert!(result.is_err());
        assert_eq!(*journal.lock(), vec!["a:request:before"]);
    }

    #[tokio::test]
    async fn empty_chain_echoes_the_connection() {
        let chain = Chain::new("empty", Side::Server);
        assert!(chain.is_empty());
        let conn = Connection::new("c1", "fw").with_label("app", "web");
        let out = chain
            .request(&Context::background(), Request::new(conn.clone()))
            .await
            .unwrap();
        assert_eq!(out, conn);
        chain.close(&Context::background(), &conn).await.unwrap();
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut chain = Chain::new("test", Side::Server);
        chain.add_stage_with_name("inspect", Inspect::new("x")).unwrap();
        let err = chain
            .add_stage_with_name("inspect", Passthrough)
            .unwrap_err();
        assert!(matches!(err, ChainBuildError::DuplicateStageName(name) if name == "inspect"));
    }

    #[test]
    fn get_stage_by_name() {
        let mut chain = Chain::new("test", Side::Server).add_stage(Passthrough);
        chain
            .add_shared_stage_with_name("inspect", Arc::new(Inspect::new("probe")))
            .unwrap();
        let chain = chain.add_stage(Passthrough);

        assert_eq!(
            chain.stage_names().collect::<Vec<_>>(),
            vec!["stage-0", "inspect", "stage-2"]
        );
        assert!(chain.get_stage::<Inspect>("inspect").is_some());
        assert!(chain.get_stage::<Passthrough>("inspect").is_none());
        assert!(chain.get_stage::<Passthrough>("stage-0").is_some());
        assert!(chain.get_stage::<Passthrough>("missing").is_none());
    }
}
