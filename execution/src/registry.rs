//! Live games, one per (chat, player).
//!
//! Every key owns an async lock around an optional value. Holding a [Seat] is what
//! serializes actions, resolution and expiry for that key; unrelated keys never wait on
//! each other.

use parlor_types::execution::AccountId;
use std::{
    collections::HashMap,
    fmt,
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Identifies a table: one player in one chat.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct TableKey {
    pub chat: String,
    pub player: AccountId,
}

impl TableKey {
    pub fn new(chat: impl Into<String>, player: AccountId) -> Self {
        Self {
            chat: chat.into(),
            player,
        }
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chat, self.player)
    }
}

type Slot<T> = Arc<AsyncMutex<Option<T>>>;

struct Inner<T> {
    slots: Mutex<HashMap<TableKey, Slot<T>>>,
    live: AtomicUsize,
}

/// Returned by [Registry::try_create].
#[derive(Debug)]
pub enum CreateError<E> {
    /// The key already holds a value. The factory was not run.
    AlreadyActive,
    Factory(E),
}

pub struct Registry<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                slots: Mutex::new(HashMap::new()),
                live: AtomicUsize::new(0),
            }),
        }
    }

    fn slot(&self, key: &TableKey) -> Slot<T> {
        let mut slots = self
            .inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        slots.entry(key.clone()).or_default().clone()
    }

    /// Wait for exclusive access to `key`.
    pub async fn seat(&self, key: &TableKey) -> Seat<T> {
        let slot = self.slot(key);
        let guard = slot.clone().lock_owned().await;
        Seat {
            key: key.clone(),
            guard,
            slot,
            inner: self.inner.clone(),
        }
    }

    /// Create a value under `key` unless one already exists.
    ///
    /// The factory runs while the key is held, so two concurrent calls for one key can
    /// never both run it. A failed factory leaves the key empty.
    pub async fn try_create<F, Fut, E>(
        &self,
        key: &TableKey,
        factory: F,
    ) -> Result<Seat<T>, CreateError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut seat = self.seat(key).await;
        if seat.get().is_some() {
            return Err(CreateError::AlreadyActive);
        }
        let value = factory().await.map_err(CreateError::Factory)?;
        seat.insert(value);
        Ok(seat)
    }

    /// Remove and return the value under `key`, if any.
    pub async fn remove(&self, key: &TableKey) -> Option<T> {
        self.seat(key).await.take()
    }

    pub async fn get(&self, key: &TableKey) -> Option<T>
    where
        T: Clone,
    {
        self.seat(key).await.get().cloned()
    }

    /// Number of keys currently holding a value.
    pub fn len(&self) -> usize {
        self.inner.live.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys that currently have a slot (held, awaited or occupied).
    pub fn keys(&self) -> Vec<TableKey> {
        let slots = self
            .inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        slots.keys().cloned().collect()
    }
}

/// Exclusive access to one key of a [Registry].
pub struct Seat<T> {
    key: TableKey,
    guard: OwnedMutexGuard<Option<T>>,
    slot: Slot<T>,
    inner: Arc<Inner<T>>,
}

impl<T> Seat<T> {
    pub fn key(&self) -> &TableKey {
        &self.key
    }

    pub fn get(&self) -> Option<&T> {
        self.guard.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.guard.as_mut()
    }

    /// Store `value`, returning any value it replaces.
    pub fn insert(&mut self, value: T) -> Option<T> {
        let previous = self.guard.replace(value);
        if previous.is_none() {
            self.inner.live.fetch_add(1, Ordering::AcqRel);
        }
        previous
    }

    pub fn take(&mut self) -> Option<T> {
        let value = self.guard.take();
        if value.is_some() {
            self.inner.live.fetch_sub(1, Ordering::AcqRel);
        }
        value
    }
}

impl<T> Drop for Seat<T> {
    fn drop(&mut self) {
        if self.guard.is_some() {
            return;
        }
        // The map, this seat and its guard account for three references. Anyone else
        // holding the slot is waiting for it, so it must stay.
        let mut slots = self
            .inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(&self.slot) == 3 {
            slots.remove(&self.key);
        }
    }
}
