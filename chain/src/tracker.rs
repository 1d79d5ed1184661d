// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Tracking of the dataplane resources created for each connection.
//!
//! Every connection owns a slot guarded by an asynchronous mutex. Operations on one connection
//! are serialized through that mutex, operations on different connections only contend on the
//! map shard. A slot is removed from the map before its record is taken out, and holders of a
//! stale slot retry on the current one, so a check-then-create (a [`claim`](ConnTracker::claim))
//! cannot race with another claim or with a removal.

use dashmap::DashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
#[allow(unused)]
use tracing::{debug, trace};

use crate::connection::ConnId;

type Slot<R> = Arc<Mutex<Option<R>>>;

/// What the tracker knows about a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum TrackState {
    /// No record and nobody configuring
    Unconfigured,
    /// A reservation is held and the resources are being created
    Configuring,
    /// A record exists
    Applied,
}

/// Outcome of [`ConnTracker::claim`]
#[derive(Debug)]
pub enum Claim<'a, R> {
    /// The connection already has a record; a copy of it is returned
    Applied(R),
    /// The connection has no record and the caller has exclusive right to create one
    Vacant(Reservation<'a, R>),
}

/// Exclusive right to create the record of a connection.
///
/// Other claims, loads and stores for the same connection wait until the reservation is
/// committed or dropped. Dropping it without committing leaves the connection untracked.
pub struct Reservation<'a, R> {
    tracker: &'a ConnTracker<R>,
    id: ConnId,
    slot: Slot<R>,
    guard: Option<OwnedMutexGuard<Option<R>>>,
}

impl<R> Debug for Reservation<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation").field("id", &self.id).finish()
    }
}

impl<R> Reservation<'_, R> {
    #[must_use]
    pub fn id(&self) -> &ConnId {
        &self.id
    }

    /// Record the resources of the connection and release the reservation
    pub fn commit(mut self, record: R) {
        if let Some(mut guard) = self.guard.take() {
            *guard = Some(record);
            trace!(conn = %self.id, "record committed");
        }
    }

    /// Release the reservation without recording anything
    pub fn abandon(self) {}
}

impl<R> Drop for Reservation<'_, R> {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            if guard.is_none() {
                // remove while still holding the lock: waiters will find the slot stale
                self.tracker
                    .slots
                    .remove_if(&self.id, |_, slot| Arc::ptr_eq(slot, &self.slot));
                trace!(conn = %self.id, "reservation abandoned");
            }
            drop(guard);
        }
    }
}

/// Concurrency-safe map from connection to the resources created for it
pub struct ConnTracker<R> {
    slots: DashMap<ConnId, Slot<R>>,
}

impl<R> Debug for ConnTracker<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnTracker")
            .field("connections", &self.slots.len())
            .finish()
    }
}

impl<R> Default for ConnTracker<R> {
    fn default() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }
}

impl<R: Clone + Send + 'static> ConnTracker<R> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connections tracked, including those being configured
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn is_current(&self, id: &ConnId, slot: &Slot<R>) -> bool {
        self.slots
            .get(id)
            .is_some_and(|current| Arc::ptr_eq(current.value(), slot))
    }

    /// Lock the current slot of a connection, creating it if needed
    async fn lock_current(&self, id: &ConnId) -> (Slot<R>, OwnedMutexGuard<Option<R>>) {
        loop {
            let slot = self.slots.entry(id.clone()).or_default().value().clone();
            let guard = slot.clone().lock_owned().await;
            if self.is_current(id, &slot) {
                return (slot, guard);
            }
        }
    }

    /// Atomically check whether a connection has a record and, if not, reserve the right to
    /// create it.
    pub async fn claim(&self, id: &ConnId) -> Claim<'_, R> {
        let (slot, guard) = self.lock_current(id).await;
        match guard.as_ref() {
            Some(record) => Claim::Applied(record.clone()),
            None => Claim::Vacant(Reservation {
                tracker: self,
                id: id.clone(),
                slot,
                guard: Some(guard),
            }),
        }
    }

    /// Get a copy of the record of a connection
    pub async fn load(&self, id: &ConnId) -> Option<R> {
        let slot = self.slots.get(id).map(|slot| slot.value().clone())?;
        let guard = slot.lock().await;
        guard.clone()
    }

    /// Set the record of a connection, replacing any previous one
    pub async fn store(&self, id: &ConnId, record: R) {
        let (_, mut guard) = self.lock_current(id).await;
        *guard = Some(record);
    }

    /// Atomically remove the record of a connection and return it.
    ///
    /// If the connection is being configured, this waits for the outcome: the record committed
    /// by the reservation is returned, or nothing if the reservation is abandoned.
    pub async fn load_and_delete(&self, id: &ConnId) -> Option<R> {
        let (_, slot) = self.slots.remove(id)?;
        let mut guard = slot.lock().await;
        guard.take()
    }

    /// Tell where a connection stands, without waiting
    #[must_use]
    pub fn state(&self, id: &ConnId) -> TrackState {
        let Some(slot) = self.slots.get(id).map(|slot| slot.value().clone()) else {
            return TrackState::Unconfigured;
        };
        match slot.try_lock() {
            Err(_) => TrackState::Configuring,
            Ok(guard) if guard.is_some() => TrackState::Applied,
            Ok(_) => TrackState::Unconfigured,
        }
    }
}
