// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Request-scoped context: per-connection values, a deadline and a cancellation signal.
//!
//! A [`Context`] travels with every `request` and `close` along a chain. Cleanup after a failed
//! request must not be aborted by the very cancellation that may have caused the failure, so a
//! context can be [postponed](Context::postpone): the values are copied out while the request is
//! still healthy and a fresh context is built from them on demand, with its own cancellation and
//! a new deadline.

use std::future::{Future, pending};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};

use crate::metadata::Metadata;

/// Extra time granted to a postponed context on top of the budget it captured
pub const POSTPONE_GRACE: Duration = Duration::from_millis(500);

/// Why a context is no longer usable
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("context cancelled")]
    Cancelled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug, Clone)]
struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }
    fn cancel(&self) {
        self.tx.send_replace(true);
    }
    fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
    async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            // unreachable while we hold the sender
            pending::<()>().await;
        }
    }
}

/// The context of a chain operation
#[derive(Debug, Clone)]
pub struct Context {
    metadata: Option<Arc<Metadata>>,
    deadline: Option<Instant>,
    cancel: CancelToken,
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl Context {
    /// A context with no values, no deadline and its own cancellation
    #[must_use]
    pub fn background() -> Self {
        Self {
            metadata: None,
            deadline: None,
            cancel: CancelToken::new(),
        }
    }

    /// Derive a context that expires after `timeout`, or earlier if `self` expires first.
    /// Cancelling either context cancels both.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            metadata: self.metadata.clone(),
            deadline: Some(self.deadline.map_or(deadline, |d| d.min(deadline))),
            cancel: self.cancel.clone(),
        }
    }

    /// Derive a context carrying the given per-connection metadata
    #[must_use]
    pub fn with_metadata(&self, metadata: Arc<Metadata>) -> Self {
        Self {
            metadata: Some(metadata),
            deadline: self.deadline,
            cancel: self.cancel.clone(),
        }
    }

    #[must_use]
    pub fn metadata(&self) -> Option<&Arc<Metadata>> {
        self.metadata.as_ref()
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel this context and every context sharing its cancellation
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Tell if the context is still usable, and why not if it isn't
    ///
    /// # Errors
    ///
    /// Returns the reason the context is done.
    pub fn err(&self) -> Result<(), ContextError> {
        if self.cancel.is_cancelled() {
            Err(ContextError::Cancelled)
        } else if self.deadline.is_some_and(|d| d <= Instant::now()) {
            Err(ContextError::DeadlineExceeded)
        } else {
            Ok(())
        }
    }

    /// Resolves when the context is cancelled or its deadline passes
    pub async fn done(&self) -> ContextError {
        let expired = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };
        tokio::select! {
            () = self.cancel.cancelled() => ContextError::Cancelled,
            () = expired => ContextError::DeadlineExceeded,
        }
    }

    /// Drive `fut` to completion unless the context is done first
    ///
    /// # Errors
    ///
    /// Returns the reason the context ended if it ends before `fut` completes.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, ContextError> {
        self.err()?;
        tokio::select! {
            biased;
            out = fut => Ok(out),
            reason = self.done() => Err(reason),
        }
    }

    /// Capture the values of this context and the time it has left, to build a cleanup context
    /// later on.
    #[must_use]
    pub fn postpone(&self) -> Postponed {
        Postponed {
            metadata: self.metadata.clone(),
            budget: self
                .deadline
                .map(|d| d.saturating_duration_since(Instant::now())),
        }
    }
}

/// A snapshot of a [`Context`], taken by [`Context::postpone`]
#[derive(Debug, Clone)]
pub struct Postponed {
    metadata: Option<Arc<Metadata>>,
    budget: Option<Duration>,
}

impl Postponed {
    /// Build a fresh context from the snapshot. It does not share the original cancellation and
    /// gets a new deadline: the captured budget plus [`POSTPONE_GRACE`].
    #[must_use]
    pub fn context(&self) -> Context {
        Context {
            metadata: self.metadata.clone(),
            deadline: self
                .budget
                .map(|budget| Instant::now() + budget + POSTPONE_GRACE),
            cancel: CancelToken::new(),
        }
    }
}
