//! # cachekv - A Pluggable Key/Value Caching Layer
//!
//! cachekv puts one small key/value interface in front of interchangeable
//! storage engines. Callers address caches by name; which backend serves a
//! name is decided by configuration, so swapping memory for Redis never
//! touches a call site.
//!
//! ## Features
//!
//! - **Five engines**: in-process memory, one-file-per-entry filesystem,
//!   Redis, memcached and a no-op Null engine
//! - **Explicit misses**: `read` returns `Option<Value>`, so a stored `false`
//!   or null is never confused with an absent key
//! - **Native counters**: integers are stored as plain decimal so Redis and
//!   memcached increment them atomically
//! - **Lazy expiry**: nothing sweeps in the background; expiry is evaluated on
//!   access against the entry's write time
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                             CacheRegistry                               │
//! │   name ──> CacheConfig ──> Engine (built once, memoized)                │
//! │            disable() ──> shared Null engine for every name              │
//! └──────────────────────────────────┬──────────────────────────────────────┘
//!                                    │
//!        ┌──────────────┬────────────┼─────────────┬────────────────┐
//!        ▼              ▼            ▼             ▼                ▼
//!  ┌──────────┐  ┌────────────┐ ┌────────┐  ┌────────────┐  ┌──────────────┐
//!  │ Memory   │  │ File       │ │ Null   │  │ Redis      │  │ Memcached    │
//!  │ 64 shards│  │ mtime+TTL  │ │        │  │ redis crate│  │memcache crate│
//!  └──────────┘  └─────┬──────┘ └────────┘  └─────┬──────┘  └──────┬───────┘
//!                      │                          │                │
//!                      └──── KeyNormalizer + Codec (prefix, type marker) ┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use cachekv::{CacheConfig, CacheRegistry, Value};
//!
//! let registry = CacheRegistry::new();
//! registry.configure("default", CacheConfig::memory()).unwrap();
//!
//! let cache = registry.resolve("default").unwrap();
//! assert!(cache.write("counter", 100));
//! assert_eq!(cache.increment("counter", 1).unwrap(), 101);
//! assert_eq!(cache.increment("counter", 9).unwrap(), 110);
//! assert_eq!(cache.read("counter"), Some(Value::Int(110)));
//!
//! assert!(cache.clear());
//! assert!(!cache.exists("counter"));
//! ```
//!
//! ## Module Overview
//!
//! - [`registry`]: name resolution, memoization and the disable switch
//! - [`engine`]: the [`CacheStore`] contract and the five engines
//! - [`config`]: configuration records, per-engine typed configs and file loading
//! - [`codec`]: the byte encoding used by the File, Redis and memcached engines
//! - [`key`]: prefixing and sanitizing of caller keys
//! - [`duration`]: fixed and relative (`"+1 month"`) TTLs
//! - [`connection`]: the memcached client seam and persistent connection pools
//!
//! ## Design Highlights
//!
//! ### Best-effort operations
//!
//! A cache must never take its caller down. `write`, `delete`, `exists` and
//! `clear` report failures as `false` and `read` reports them as a miss; only
//! construction and counters return [`CacheError`].
//!
//! ### Relative durations
//!
//! A duration like `"+1 month"` is resolved against the clock on every
//! operation, so the TTL window follows the calendar rather than a fixed
//! number of seconds captured at configuration time.

pub mod codec;
pub mod config;
pub mod connection;
pub mod duration;
pub mod engine;
pub mod error;
pub mod key;
pub mod registry;
pub mod value;

// Re-export commonly used types for convenience
pub use codec::Codec;
pub use config::{load_cache_configs, CacheConfig, Persistent};
pub use duration::{CacheDuration, Ttl};
pub use engine::{CacheStore, Engine, EngineKind};
pub use error::{CacheError, CacheResult};
pub use key::KeyNormalizer;
pub use registry::{CacheRegistry, DEFAULT_CACHE};
pub use value::Value;

/// Version of cachekv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
