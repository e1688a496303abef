//! Live connection registry
//!
//! Every accepted connection registers here and gets a [`Registration`]
//! back. Dropping the registration is the only way an entry leaves the
//! registry, so an entry lives exactly as long as the connection owning it.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use crate::transport::InputHandle;

/// Process-unique connection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

impl From<u64> for ConnectionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

struct Entry {
    peer_addr: Option<SocketAddr>,
    input: InputHandle,
}

struct RegistryInner {
    next_id: AtomicU64,
    live: DashMap<ConnectionId, Entry>,
    count: watch::Sender<usize>,
}

impl RegistryInner {
    // The count lives in the channel so concurrent updates never publish a stale value
    fn count_added(&self) {
        self.count.send_modify(|live| *live += 1);
    }

    fn count_removed(&self) {
        self.count.send_modify(|live| *live = live.saturating_sub(1));
    }
}

/// A live connection as seen from the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub peer_addr: Option<SocketAddr>,
    pub input_shutdown: bool,
}

/// Set of live connections. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("live", &self.len())
            .finish()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            inner: Arc::new(RegistryInner {
                next_id: AtomicU64::new(1),
                live: DashMap::new(),
                count,
            }),
        }
    }

    /// Add a connection whose reads are cancelled through `input`
    pub fn register(&self, peer_addr: Option<SocketAddr>, input: InputHandle) -> Registration {
        let id = ConnectionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.live.insert(id, Entry { peer_addr, input });
        self.inner.count_added();
        Registration {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.live.is_empty()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.inner.live.contains_key(&id)
    }

    /// Point-in-time view of every live connection, ordered by id
    pub fn snapshot(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<ConnectionInfo> = self
            .inner
            .live
            .iter()
            .map(|entry| ConnectionInfo {
                id: *entry.key(),
                peer_addr: entry.value().peer_addr,
                input_shutdown: entry.value().input.is_shutdown(),
            })
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Shut down the input of every live connection.
    ///
    /// Each connection then finishes the requests it already read and closes.
    /// Returns how many connections had their input shut down by this call.
    pub fn shutdown_all(&self) -> usize {
        // Collect first so no shard lock is held while waking readers
        let inputs: Vec<(ConnectionId, InputHandle)> = self
            .inner
            .live
            .iter()
            .map(|entry| (*entry.key(), entry.value().input.clone()))
            .collect();

        let mut closed = 0;
        for (id, input) in inputs {
            match input.shutdown() {
                Ok(()) => closed += 1,
                Err(e) => debug!(connection_id = %id, error = %e, "Input already closed"),
            }
        }
        closed
    }

    /// Resolves once no connection is registered
    pub async fn wait_until_empty(&self) {
        let mut count = self.inner.count.subscribe();
        let _ = count.wait_for(|live| *live == 0).await;
    }
}

/// Membership of one connection in the registry; removes it when dropped
pub struct Registration {
    id: ConnectionId,
    registry: Weak<RegistryInner>,
}

impl Registration {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration").field("id", &self.id).finish()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            if inner.live.remove(&self.id).is_some() {
                inner.count_removed();
            }
        }
    }
}
