//! Network Connection Module
//!
//! Blocking clients used by the network engines.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      CacheRegistry                          │
//! │                                                             │
//! │   SharedConnections                                         │
//! │   ┌──────────────────────┐   ┌──────────────────────┐       │
//! │   │ PersistentPool       │   │ PersistentPool       │       │
//! │   │ <RedisConnection>    │   │ <memcache::Client>   │       │
//! │   └──────────┬───────────┘   └──────────┬───────────┘       │
//! └──────────────┼──────────────────────────┼───────────────────┘
//!                │ persistent               │ persistent
//!                ▼                          ▼
//!         ┌─────────────┐           ┌───────────────┐
//!         │ RedisEngine │           │MemcachedEngine│
//!         └─────────────┘           └───────┬───────┘
//!                                           │ dyn MemcachedClient
//!                                           ▼
//!                                  ┌──────────────────┐
//!                                  │ memcache::Client │
//!                                  └──────────────────┘
//! ```
//!
//! Non-persistent connections are owned by their engine and close when it
//! is dropped.

pub mod memcached;
pub mod pool;

pub use memcached::MemcachedClient;
pub use pool::{pool_key, PersistentPool, RedisConnection, SharedConnections};
