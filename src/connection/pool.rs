//! Persistent connection pool
//!
//! Network engines configured with `persistent` take their connection from
//! here instead of opening their own. A pooled client is keyed by
//! persistent id and endpoint, shared by every engine that asks for the same
//! key, and stays open until the pool itself is dropped.

use crate::config::Endpoint;
use crate::error::CacheResult;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Builds the pool key for a persistent id and endpoint.
pub fn pool_key(id: &str, endpoint: &Endpoint) -> String {
    format!("{}@{}", id, endpoint)
}

/// A Redis connection behind the lock that serializes its commands.
pub type RedisConnection = Mutex<Box<dyn redis::ConnectionLike + Send>>;

/// Connections shared across engine instances.
pub struct PersistentPool<C> {
    connections: Mutex<HashMap<String, Arc<C>>>,
}

impl<C> PersistentPool<C> {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the pooled connection for `key`, opening it with `connect` on
    /// first use. A failed connect leaves nothing in the pool.
    pub fn get_or_connect<F>(&self, key: &str, connect: F) -> CacheResult<Arc<C>>
    where
        F: FnOnce() -> CacheResult<C>,
    {
        let mut connections = self.connections.lock();

        if let Some(existing) = connections.get(key) {
            debug!(pool_key = key, "Reusing persistent connection");
            return Ok(Arc::clone(existing));
        }

        let connection = Arc::new(connect()?);
        connections.insert(key.to_string(), Arc::clone(&connection));
        debug!(pool_key = key, "Opened persistent connection");
        Ok(connection)
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<C> Default for PersistentPool<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Pools for every network engine, owned by the registry.
#[derive(Default)]
pub struct SharedConnections {
    pub redis: PersistentPool<RedisConnection>,
    pub memcached: PersistentPool<memcache::Client>,
}

impl SharedConnections {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for SharedConnections {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedConnections")
            .field("redis", &self.redis.len())
            .field("memcached", &self.memcached.len())
            .finish()
    }
}
