//! In-Memory Engine
//!
//! A process-local map from storage key to [`Value`]. No codec, no TTL:
//! entries live until they are deleted, cleared, or the engine is dropped.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     MemoryEngine                            │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Keys are distributed across shards by hash, so threads touching different
//! keys rarely contend. Counters update under the shard's write lock and are
//! atomic with respect to other callers of this engine.

use crate::config::MemoryConfig;
use crate::engine::{apply_offset, CacheStore};
use crate::error::CacheResult;
use crate::key::KeyNormalizer;
use crate::value::Value;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Number of shards.
const NUM_SHARDS: usize = 64;

type Shard = RwLock<HashMap<String, Value>>;

/// Operation counters for the memory engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    pub keys: usize,
    pub reads: u64,
    pub hits: u64,
    pub writes: u64,
    pub deletes: u64,
}

/// Cache engine backed by a sharded in-process map.
pub struct MemoryEngine {
    keys: KeyNormalizer,
    shards: Vec<Shard>,
    read_count: AtomicU64,
    hit_count: AtomicU64,
    write_count: AtomicU64,
    delete_count: AtomicU64,
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("prefix", &self.keys.prefix())
            .field("shards", &self.shards.len())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}

impl MemoryEngine {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            keys: KeyNormalizer::new(config.prefix),
            shards: (0..NUM_SHARDS).map(|_| RwLock::new(HashMap::new())).collect(),
            read_count: AtomicU64::new(0),
            hit_count: AtomicU64::new(0),
            write_count: AtomicU64::new(0),
            delete_count: AtomicU64::new(0),
        }
    }

    #[inline]
    fn shard(&self, key: &str) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % NUM_SHARDS]
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.read().is_empty())
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            keys: self.len(),
            reads: self.read_count.load(Ordering::Relaxed),
            hits: self.hit_count.load(Ordering::Relaxed),
            writes: self.write_count.load(Ordering::Relaxed),
            deletes: self.delete_count.load(Ordering::Relaxed),
        }
    }
}

impl CacheStore for MemoryEngine {
    fn write(&self, key: &str, value: Value) -> bool {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        let key = self.keys.key(key);
        debug!(key = %key, kind = value.type_name(), engine = "memory", "Cache SET");
        self.shard(&key).write().insert(key, value);
        true
    }

    fn read(&self, key: &str) -> Option<Value> {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        let key = self.keys.key(key);
        let value = self.shard(&key).read().get(&key).cloned();

        if value.is_some() {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, engine = "memory", "Cache HIT");
        } else {
            debug!(key = %key, engine = "memory", "Cache MISS");
        }
        value
    }

    fn exists(&self, key: &str) -> bool {
        let key = self.keys.key(key);
        self.shard(&key).read().contains_key(&key)
    }

    fn delete(&self, key: &str) -> bool {
        self.delete_count.fetch_add(1, Ordering::Relaxed);
        let key = self.keys.key(key);
        let removed = self.shard(&key).write().remove(&key).is_some();
        debug!(key = %key, removed = removed, engine = "memory", "Cache DELETE");
        removed
    }

    fn clear(&self) -> bool {
        let stats = self.stats();
        for shard in &self.shards {
            shard.write().clear();
        }
        debug!(
            engine = "memory",
            removed = stats.keys,
            reads = stats.reads,
            hits = stats.hits,
            writes = stats.writes,
            deletes = stats.deletes,
            "Cache CLEAR"
        );
        true
    }

    fn increment(&self, key: &str, offset: i64) -> CacheResult<i64> {
        let key = self.keys.key(key);
        let mut data = self.shard(&key).write();

        let next = apply_offset(&key, data.get(&key), offset)?;
        data.insert(key, Value::Int(next));
        Ok(next)
    }

    fn engine_name(&self) -> &'static str {
        "memory"
    }
}
