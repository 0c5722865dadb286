//! Connection registry: the gateway's broadcast pool.
//!
//! Tracks every currently authorized WebSocket connection. The registry is
//! the single owner of this state; connections are added exactly once after
//! a successful handshake and removed exactly once on disconnect, both from
//! gateway code. No other component mutates the pool.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

/// Unique identifier for one WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a fresh connection id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Metadata recorded for an authorized connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// User id from the verified session token.
    pub user_id: String,

    /// When the connection was admitted.
    pub connected_at: DateTime<Utc>,
}

impl ConnectionInfo {
    /// Creates connection metadata stamped with the current time.
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            connected_at: Utc::now(),
        }
    }
}

/// The set of currently authorized connections.
///
/// Cloning is cheap; clones share the same underlying map. Interior
/// mutability keeps the lock scope to individual operations, all of which
/// are short and non-blocking.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<ConnectionId, ConnectionInfo>>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an authorized connection to the pool.
    pub fn add(&self, id: ConnectionId, info: ConnectionInfo) {
        let mut connections = self.connections.write().unwrap();
        if let Some(previous) = connections.insert(id, info) {
            // Connection ids are random; a collision points at a caller bug.
            warn!(
                connection_id = %id,
                user_id = %previous.user_id,
                "Replaced existing registry entry"
            );
        }
        debug!(
            connection_id = %id,
            pool_size = connections.len(),
            "Connection joined broadcast pool"
        );
    }

    /// Removes a connection from the pool, returning its metadata if present.
    ///
    /// Safe to call for ids that were never admitted (e.g. a handshake torn
    /// down mid-upgrade); that is a no-op.
    pub fn remove(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        let mut connections = self.connections.write().unwrap();
        let removed = connections.remove(&id);
        if removed.is_some() {
            debug!(
                connection_id = %id,
                pool_size = connections.len(),
                "Connection left broadcast pool"
            );
        }
        removed
    }

    /// Returns whether a connection is currently in the pool.
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().unwrap().contains_key(&id)
    }

    /// Returns a connection's metadata, if it is in the pool.
    #[must_use]
    pub fn get(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        self.connections.read().unwrap().get(&id).cloned()
    }

    /// Number of connections currently in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.read().unwrap().len()
    }

    /// Returns `true` when the pool is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.read().unwrap().is_empty()
    }
}
