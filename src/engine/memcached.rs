//! Memcached Engine
//!
//! Stores codec-encoded values in a memcached server through the `memcache`
//! client. Integers are stored as bare decimal so `incr` operates on them
//! natively.
//!
//! Memcached cannot list keys, so a prefixed engine namespaces its entries
//! with a generation number kept under `<prefix>:generation`:
//!
//! ```text
//! storage key = <prefix><generation>:<sanitized key>
//! ```
//!
//! `clear` bumps the generation, which leaves every older entry unreachable
//! until the server evicts it. Engines with another prefix keep their own
//! generation and are untouched. An engine without a prefix owns the whole
//! server and clears it with `flush_all`.
//!
//! Memcached counters are unsigned 64-bit. Decrements go through `gets`/`cas`
//! so that a result below zero is refused with
//! [`CacheError::UnsupportedOperation`] instead of being clamped by `decr`.

use crate::codec::Codec;
use crate::config::{Endpoint, MemcachedConfig};
use crate::connection::{pool_key, MemcachedClient, PersistentPool};
use crate::duration::Ttl;
use crate::engine::CacheStore;
use crate::error::{CacheError, CacheResult};
use crate::key::{sanitize, KeyNormalizer};
use crate::value::Value;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Longest key memcached accepts.
pub const MAX_KEY_LENGTH: usize = 250;

/// Longest relative exptime memcached accepts; larger values are unix times.
const MAX_RELATIVE_EXPTIME: u64 = 60 * 60 * 24 * 30;

const GENERATION_SUFFIX: &str = ":generation";

/// `gets`/`cas` rounds a decrement tries before giving up.
const CAS_ATTEMPTS: usize = 16;

/// Cache engine backed by a memcached server.
pub struct MemcachedEngine {
    keys: KeyNormalizer,
    ttl: Ttl,
    endpoint: Endpoint,
    persistent: Option<String>,
    client: Arc<dyn MemcachedClient>,
}

impl std::fmt::Debug for MemcachedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemcachedEngine")
            .field("endpoint", &self.endpoint.to_string())
            .field("prefix", &self.keys.prefix())
            .field("persistent", &self.persistent)
            .finish()
    }
}

impl MemcachedEngine {
    /// Connects to the configured server, or reuses a pooled client when
    /// `persistent` is set.
    pub fn connect(
        config: MemcachedConfig,
        pool: &PersistentPool<memcache::Client>,
    ) -> CacheResult<Self> {
        let open = || crate::connection::memcached::connect(&config.endpoint, config.timeout);

        let client = match &config.persistent {
            Some(id) => pool.get_or_connect(&pool_key(id, &config.endpoint), open)?,
            None => Arc::new(open()?),
        };

        info!(
            endpoint = %config.endpoint,
            persistent = config.persistent.is_some(),
            "Memcached cache engine connected"
        );

        Ok(Self::with_client(config, client))
    }

    /// Builds an engine on an already connected client.
    pub fn with_client(config: MemcachedConfig, client: Arc<dyn MemcachedClient>) -> Self {
        Self {
            keys: KeyNormalizer::new(config.prefix),
            ttl: config.ttl,
            endpoint: config.endpoint,
            persistent: config.persistent,
            client,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The persistent connection id, if this engine shares its client.
    pub fn persistent_id(&self) -> Option<&str> {
        self.persistent.as_deref()
    }

    fn generation_key(&self) -> String {
        format!("{}{}", self.keys.prefix(), GENERATION_SUFFIX)
    }

    /// The current namespace generation, created on first use.
    fn generation(&self) -> CacheResult<u64> {
        let key = self.generation_key();
        for _ in 0..2 {
            if let Some(data) = self.client.get(&key)? {
                return std::str::from_utf8(&data)
                    .ok()
                    .and_then(|text| text.trim().parse::<u64>().ok())
                    .ok_or_else(|| CacheError::NotAnInteger(key.clone()));
            }
            // Seeded from the clock: a lost generation key must not bring
            // back the entries of an older generation.
            self.client.add(&key, unix_millis().to_string().as_bytes(), 0)?;
        }
        Err(CacheError::Backend(format!(
            "memcached: generation `{}` vanished",
            key
        )))
    }

    /// The storage key for `key`. Fails if it exceeds memcached's key limit.
    fn storage_key(&self, key: &str) -> CacheResult<String> {
        let key = if self.keys.prefix().is_empty() {
            self.keys.key(key)
        } else {
            format!("{}{}:{}", self.keys.prefix(), self.generation()?, sanitize(key))
        };

        if key.len() > MAX_KEY_LENGTH {
            return Err(CacheError::UnsupportedOperation(format!(
                "memcached key `{}` is longer than {} bytes",
                key, MAX_KEY_LENGTH
            )));
        }
        Ok(key)
    }

    fn exptime(&self) -> u32 {
        match self.ttl.backend_seconds() {
            None => 0,
            Some(secs) => exptime_for(secs, unix_now()),
        }
    }

    fn count_up(&self, key: &str, delta: u64) -> CacheResult<i64> {
        let key = self.storage_key(key)?;
        let exptime = self.exptime();

        let value = match self.client.increment(&key, delta)? {
            Some(value) => value,
            None => {
                // A concurrent creator may win the add; incr works either way
                self.client.add(&key, b"0", exptime)?;
                self.client.increment(&key, delta)?.ok_or_else(|| {
                    CacheError::Backend(format!("memcached: counter `{}` vanished", key))
                })?
            }
        };

        if exptime > 0 {
            self.client.touch(&key, exptime)?;
        }
        counter_result(&key, value)
    }

    fn count_down(&self, key: &str, delta: u64) -> CacheResult<i64> {
        let key = self.storage_key(key)?;
        let exptime = self.exptime();

        for _ in 0..CAS_ATTEMPTS {
            let Some((data, cas)) = self.client.gets(&key)? else {
                if delta > 0 {
                    return Err(below_zero(&key, 0, delta));
                }
                self.client.add(&key, b"0", exptime)?;
                return Ok(0);
            };

            let current = stored_counter(&key, &data)?;
            let next = u64::try_from(current)
                .ok()
                .and_then(|current| current.checked_sub(delta))
                .ok_or_else(|| below_zero(&key, current, delta))?;

            if self.client.cas(&key, next.to_string().as_bytes(), exptime, cas)? {
                return counter_result(&key, next);
            }
            debug!(key = %key, engine = "memcached", "Counter changed during decrement, retrying");
        }

        Err(CacheError::Backend(format!(
            "memcached: counter `{}` changed on every one of {} decrement attempts",
            key, CAS_ATTEMPTS
        )))
    }
}

/// Parses a counter as stored: plain decimal, possibly space padded.
fn stored_counter(key: &str, data: &[u8]) -> CacheResult<i64> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.trim().parse::<i64>().ok())
        .ok_or_else(|| CacheError::NotAnInteger(key.to_string()))
}

fn counter_result(key: &str, value: u64) -> CacheResult<i64> {
    i64::try_from(value)
        .map_err(|_| CacheError::UnsupportedOperation(format!("counter `{}` exceeds i64", key)))
}

fn below_zero(key: &str, current: i64, delta: u64) -> CacheError {
    CacheError::UnsupportedOperation(format!(
        "memcached counters cannot go below zero (`{}` is {}, decrement by {})",
        key, current, delta
    ))
}

/// Converts a TTL into memcached's exptime, which switches to an absolute
/// unix timestamp above 30 days.
fn exptime_for(secs: u64, now_unix: u64) -> u32 {
    let exptime = if secs > MAX_RELATIVE_EXPTIME {
        now_unix.saturating_add(secs)
    } else {
        secs
    };
    u32::try_from(exptime).unwrap_or(u32::MAX)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

impl CacheStore for MemcachedEngine {
    fn write(&self, key: &str, value: Value) -> bool {
        let key = match self.storage_key(key) {
            Ok(key) => key,
            Err(e) => {
                warn!(key = %key, error = %e, engine = "memcached", "Cache SET failed");
                return false;
            }
        };
        let data = match Codec::encode(&value) {
            Ok(data) => data,
            Err(e) => {
                warn!(key = %key, error = %e, engine = "memcached", "Cache SET failed");
                return false;
            }
        };

        let exptime = self.exptime();
        match self.client.set(&key, &data, exptime) {
            Ok(()) => {
                debug!(key = %key, exptime = exptime, engine = "memcached", "Cache SET");
                true
            }
            Err(e) => {
                warn!(key = %key, error = %e, engine = "memcached", "Cache SET failed");
                false
            }
        }
    }

    fn read(&self, key: &str) -> Option<Value> {
        let fetched = self
            .storage_key(key)
            .and_then(|storage| Ok((self.client.get(&storage)?, storage)));
        let (data, key) = match fetched {
            Ok((Some(data), key)) => (data, key),
            Ok((None, key)) => {
                debug!(key = %key, engine = "memcached", "Cache MISS");
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, engine = "memcached", "Cache GET failed");
                return None;
            }
        };

        match Codec::decode(&data) {
            Ok(value) => {
                debug!(key = %key, engine = "memcached", "Cache HIT");
                Some(value)
            }
            Err(e) => {
                warn!(key = %key, error = %e, engine = "memcached", "Corrupt cache entry");
                None
            }
        }
    }

    fn exists(&self, key: &str) -> bool {
        match self.storage_key(key).and_then(|key| self.client.get(&key)) {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!(key = %key, error = %e, engine = "memcached", "Cache EXISTS failed");
                false
            }
        }
    }

    fn delete(&self, key: &str) -> bool {
        match self.storage_key(key).and_then(|key| self.client.delete(&key)) {
            Ok(removed) => {
                debug!(key = %key, removed = removed, engine = "memcached", "Cache DELETE");
                removed
            }
            Err(e) => {
                warn!(key = %key, error = %e, engine = "memcached", "Cache DELETE failed");
                false
            }
        }
    }

    fn clear(&self) -> bool {
        // Without a prefix every key on the server belongs to this engine
        if self.keys.prefix().is_empty() {
            return match self.client.flush() {
                Ok(()) => {
                    debug!(endpoint = %self.endpoint, engine = "memcached", "Cache CLEAR (flush_all)");
                    true
                }
                Err(e) => {
                    warn!(error = %e, engine = "memcached", "Cache CLEAR failed");
                    false
                }
            };
        }

        let key = self.generation_key();
        let bumped = match self.client.increment(&key, 1) {
            Ok(Some(generation)) => Ok(generation),
            Ok(None) => self
                .client
                .add(&key, unix_millis().saturating_add(1).to_string().as_bytes(), 0)
                .and_then(|()| self.generation()),
            Err(e) => Err(e),
        };

        match bumped {
            Ok(generation) => {
                debug!(prefix = %self.keys.prefix(), generation = generation, engine = "memcached", "Cache CLEAR");
                true
            }
            Err(e) => {
                warn!(key = %key, error = %e, engine = "memcached", "Cache CLEAR failed");
                false
            }
        }
    }

    fn increment(&self, key: &str, offset: i64) -> CacheResult<i64> {
        if offset < 0 {
            self.count_down(key, offset.unsigned_abs())
        } else {
            self.count_up(key, offset.unsigned_abs())
        }
    }

    fn decrement(&self, key: &str, offset: i64) -> CacheResult<i64> {
        if offset < 0 {
            self.count_up(key, offset.unsigned_abs())
        } else {
            self.count_down(key, offset.unsigned_abs())
        }
    }

    fn engine_name(&self) -> &'static str {
        "memcached"
    }
}
