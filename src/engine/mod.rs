//! Cache Engines
//!
//! Every engine implements the same seven operations against one storage
//! medium. [`CacheStore`] is the contract; [`Engine`] is the closed set of
//! engines a configuration can select, dispatched with a `match`.
//!
//! ## Engines
//!
//! ```text
//! ┌──────────────┬──────────────────────┬──────────┬──────────────────────┐
//! │ Kind         │ Medium               │ Codec    │ Expiry               │
//! ├──────────────┼──────────────────────┼──────────┼──────────────────────┤
//! │ memory/array │ sharded HashMap      │ no       │ none                 │
//! │ file         │ one file per entry   │ optional │ mtime + ttl, lazy    │
//! │ null         │ nothing              │ no       │ n/a                  │
//! │ redis        │ redis server         │ yes*     │ native (SETEX)       │
//! │ memcached    │ memcached server     │ yes*     │ native (exptime)     │
//! └──────────────┴──────────────────────┴──────────┴──────────────────────┘
//!   * integers are stored as plain decimal so native counters work
//! ```
//!
//! ## Failure Model
//!
//! `write`, `read`, `exists`, `delete` and `clear` never return errors: a
//! failed store is `false`, an unreadable entry is a miss, and the cause is
//! logged. Counters return [`CacheResult`] because an integer result has no
//! room for a failure value.

pub mod file;
pub mod memcached;
pub mod memory;
pub mod null;
pub mod redis;

pub use file::FileEngine;
pub use memcached::MemcachedEngine;
pub use memory::MemoryEngine;
pub use null::NullEngine;
pub use redis::RedisEngine;

use crate::config::{CacheConfig, FileConfig, MemcachedConfig, MemoryConfig, RedisConfig};
use crate::connection::SharedConnections;
use crate::error::{CacheError, CacheResult};
use crate::value::Value;
use std::fmt;
use std::str::FromStr;

/// The operations every cache engine supports.
pub trait CacheStore: Send + Sync {
    /// Stores `value` under `key` with the engine's TTL.
    fn write(&self, key: &str, value: Value) -> bool;

    /// Returns the live value under `key`, or `None` on a miss.
    fn read(&self, key: &str) -> Option<Value>;

    /// True iff a live entry exists. Never deletes anything.
    fn exists(&self, key: &str) -> bool;

    /// True iff a live entry existed and was removed.
    fn delete(&self, key: &str) -> bool;

    /// Removes every entry in this engine's namespace.
    fn clear(&self) -> bool;

    /// Adds `offset` to the integer under `key` (missing counts as 0).
    fn increment(&self, key: &str, offset: i64) -> CacheResult<i64>;

    /// Subtracts `offset` from the integer under `key` (missing counts as 0).
    fn decrement(&self, key: &str, offset: i64) -> CacheResult<i64> {
        self.increment(key, negate(offset)?)
    }

    fn engine_name(&self) -> &'static str;
}

/// Applies a counter offset to the current value of an entry.
///
/// A missing entry counts as 0. Overflow is an error, never a wrap.
pub fn apply_offset(key: &str, current: Option<&Value>, offset: i64) -> CacheResult<i64> {
    let base = match current {
        None => 0,
        Some(value) => value
            .as_counter()
            .ok_or_else(|| CacheError::NotAnInteger(key.to_string()))?,
    };

    base.checked_add(offset).ok_or_else(|| {
        CacheError::Backend(format!("counter `{}` would overflow", key))
    })
}

pub(crate) fn negate(offset: i64) -> CacheResult<i64> {
    offset
        .checked_neg()
        .ok_or_else(|| CacheError::Backend(format!("offset {} cannot be negated", offset)))
}

/// The engine kinds a configuration can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Memory,
    File,
    Null,
    Redis,
    Memcached,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Memory => "memory",
            EngineKind::File => "file",
            EngineKind::Null => "null",
            EngineKind::Redis => "redis",
            EngineKind::Memcached => "memcached",
        }
    }
}

impl FromStr for EngineKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "array" => Ok(EngineKind::Memory),
            "file" => Ok(EngineKind::File),
            "null" => Ok(EngineKind::Null),
            "redis" => Ok(EngineKind::Redis),
            "memcached" => Ok(EngineKind::Memcached),
            _ => Err(CacheError::Configuration(format!(
                "cache engine `{}` could not be found",
                s
            ))),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A constructed cache engine.
#[derive(Debug)]
pub enum Engine {
    Memory(MemoryEngine),
    File(FileEngine),
    Null(NullEngine),
    Redis(RedisEngine),
    Memcached(MemcachedEngine),
}

macro_rules! dispatch {
    ($self:ident, $engine:ident => $call:expr) => {
        match $self {
            Engine::Memory($engine) => $call,
            Engine::File($engine) => $call,
            Engine::Null($engine) => $call,
            Engine::Redis($engine) => $call,
            Engine::Memcached($engine) => $call,
        }
    };
}

impl Engine {
    /// Builds the engine a configuration record selects.
    ///
    /// Persistent network connections are taken from `connections`.
    pub fn build(config: &CacheConfig, connections: &SharedConnections) -> CacheResult<Self> {
        let engine = match config.engine.parse::<EngineKind>()? {
            EngineKind::Memory => Engine::Memory(MemoryEngine::new(MemoryConfig::from_record(config)?)),
            EngineKind::File => Engine::File(FileEngine::new(FileConfig::from_record(config)?)),
            EngineKind::Null => Engine::Null(NullEngine::new()),
            EngineKind::Redis => Engine::Redis(RedisEngine::connect(
                RedisConfig::from_record(config)?,
                &connections.redis,
            )?),
            EngineKind::Memcached => Engine::Memcached(MemcachedEngine::connect(
                MemcachedConfig::from_record(config)?,
                &connections.memcached,
            )?),
        };
        Ok(engine)
    }

    /// Builds an engine outside any registry.
    pub fn from_config(config: &CacheConfig) -> CacheResult<Self> {
        Self::build(config, &SharedConnections::new())
    }

    pub fn kind(&self) -> EngineKind {
        match self {
            Engine::Memory(_) => EngineKind::Memory,
            Engine::File(_) => EngineKind::File,
            Engine::Null(_) => EngineKind::Null,
            Engine::Redis(_) => EngineKind::Redis,
            Engine::Memcached(_) => EngineKind::Memcached,
        }
    }

    pub fn write(&self, key: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        dispatch!(self, engine => engine.write(key, value))
    }

    pub fn read(&self, key: &str) -> Option<Value> {
        dispatch!(self, engine => engine.read(key))
    }

    pub fn exists(&self, key: &str) -> bool {
        dispatch!(self, engine => engine.exists(key))
    }

    pub fn delete(&self, key: &str) -> bool {
        dispatch!(self, engine => engine.delete(key))
    }

    pub fn clear(&self) -> bool {
        dispatch!(self, engine => engine.clear())
    }

    pub fn increment(&self, key: &str, offset: i64) -> CacheResult<i64> {
        dispatch!(self, engine => engine.increment(key, offset))
    }

    pub fn decrement(&self, key: &str, offset: i64) -> CacheResult<i64> {
        dispatch!(self, engine => engine.decrement(key, offset))
    }

    pub fn engine_name(&self) -> &'static str {
        dispatch!(self, engine => engine.engine_name())
    }
}
