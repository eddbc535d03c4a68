//! Client registry
//!
//! The authoritative set of connected clients. It is shared between the
//! listener, every receive worker and the broadcaster as `Arc<ClientRegistry>`.
//!
//! # Locking
//!
//! A single `parking_lot::RwLock` guards the map. Mutations take the write
//! lock; snapshots take the read lock, clone the `Arc` handles and release it
//! before the caller does any I/O. No socket operation ever happens while the
//! lock is held.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{ChatError, Result};
use crate::socket_server::connection::ConnectionHandle;

/// Unique identifier for a connected client
///
/// Assigned at accept time and never reused by the same registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

impl ClientId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Registry of connected clients, keyed and ordered by id
pub struct ClientRegistry {
    clients: RwLock<BTreeMap<ClientId, Arc<ConnectionHandle>>>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh client id
    pub fn next_id(&self) -> ClientId {
        ClientId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a connection under its id
    pub fn add(&self, handle: Arc<ConnectionHandle>) -> Result<()> {
        let id = handle.id();
        let mut clients = self.clients.write();
        if clients.contains_key(&id) {
            return Err(ChatError::DuplicateId(id));
        }
        clients.insert(id, handle);
        Ok(())
    }

    /// Remove a client; absent ids are ignored
    pub fn remove(&self, id: ClientId) -> Option<Arc<ConnectionHandle>> {
        self.clients.write().remove(&id)
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }

    /// Ids of all registered clients, ascending
    pub fn ids(&self) -> Vec<ClientId> {
        self.clients.read().keys().copied().collect()
    }

    /// Point-in-time copy of every entry
    pub fn snapshot(&self) -> Vec<(ClientId, Arc<ConnectionHandle>)> {
        self.clients
            .read()
            .iter()
            .map(|(id, handle)| (*id, Arc::clone(handle)))
            .collect()
    }

    /// Point-in-time copy of every entry except `excluded`
    ///
    /// The lock is released before this returns, so iterating the result
    /// (and sending on the handles) never blocks registry mutations.
    pub fn snapshot_excluding(&self, excluded: ClientId) -> Vec<(ClientId, Arc<ConnectionHandle>)> {
        self.clients
            .read()
            .iter()
            .filter(|(id, _)| **id != excluded)
            .map(|(id, handle)| (*id, Arc::clone(handle)))
            .collect()
    }

    /// Remove and return every entry
    pub fn drain(&self) -> Vec<(ClientId, Arc<ConnectionHandle>)> {
        std::mem::take(&mut *self.clients.write())
            .into_iter()
            .collect()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
