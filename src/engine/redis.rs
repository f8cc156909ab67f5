//! Redis Engine
//!
//! Stores codec-encoded values in a Redis server over the synchronous
//! `redis` client. Integers are stored as bare decimal, so `INCRBY` and
//! `DECRBY` work on them in place and stay atomic on the server.
//!
//! Expiry is native: `SETEX` when a TTL applies, plain `SET` otherwise, and an
//! `EXPIRE` after every counter update because `INCRBY` keeps whatever TTL the
//! key already had (none, for a key it just created).

use crate::codec::Codec;
use crate::config::{Endpoint, RedisConfig};
use crate::connection::{pool_key, PersistentPool, RedisConnection};
use crate::duration::Ttl;
use crate::engine::CacheStore;
use crate::error::{CacheError, CacheResult};
use crate::key::KeyNormalizer;
use crate::value::Value;
use parking_lot::Mutex;
use redis::{ConnectionAddr, ConnectionInfo, ConnectionLike, RedisConnectionInfo, RedisResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Cache engine backed by a Redis server.
pub struct RedisEngine {
    keys: KeyNormalizer,
    ttl: Ttl,
    endpoint: Endpoint,
    info: ConnectionInfo,
    timeout: Option<Duration>,
    persistent: Option<String>,
    conn: Arc<RedisConnection>,
}

impl std::fmt::Debug for RedisEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisEngine")
            .field("endpoint", &self.endpoint.to_string())
            .field("db", &self.info.redis.db)
            .field("prefix", &self.keys.prefix())
            .field("persistent", &self.persistent)
            .finish()
    }
}

impl RedisEngine {
    /// Connects to the configured server, or reuses a pooled connection when
    /// `persistent` is set.
    pub fn connect(
        config: RedisConfig,
        pool: &PersistentPool<RedisConnection>,
    ) -> CacheResult<Self> {
        let info = connection_info(&config)?;
        let connect = || -> CacheResult<RedisConnection> {
            let conn: Box<dyn ConnectionLike + Send> =
                Box::new(open(&info, &config.endpoint, config.timeout)?);
            Ok(Mutex::new(conn))
        };

        let conn = match &config.persistent {
            Some(id) => {
                let key = format!("{}/{}", pool_key(id, &config.endpoint), config.database);
                pool.get_or_connect(&key, connect)?
            }
            None => Arc::new(connect()?),
        };

        info!(
            endpoint = %config.endpoint,
            db = config.database,
            persistent = config.persistent.is_some(),
            "Redis cache engine connected"
        );

        Ok(Self::from_parts(config, info, conn))
    }

    fn from_parts(config: RedisConfig, info: ConnectionInfo, conn: Arc<RedisConnection>) -> Self {
        Self {
            keys: KeyNormalizer::new(config.prefix),
            ttl: config.ttl,
            endpoint: config.endpoint,
            info,
            timeout: config.timeout,
            persistent: config.persistent,
            conn,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Runs `f` on the connection, reopening it first if the server dropped it.
    fn with_conn<T, F>(&self, f: F) -> CacheResult<T>
    where
        F: FnOnce(&mut dyn ConnectionLike) -> RedisResult<T>,
    {
        let mut conn = self.conn.lock();
        if !conn.is_open() {
            warn!(endpoint = %self.endpoint, "Redis connection lost, reconnecting");
            *conn = Box::new(open(&self.info, &self.endpoint, self.timeout)?);
        }
        f(&mut **conn).map_err(map_redis_error)
    }

    fn counter(&self, command: &str, key: &str, delta: i64) -> CacheResult<i64> {
        let key = self.keys.key(key);
        let ttl = self.ttl.backend_seconds();

        let result = self.with_conn(|conn| {
            let next: i64 = redis::cmd(command).arg(&key).arg(delta).query(conn)?;
            if let Some(secs) = ttl {
                redis::cmd("EXPIRE").arg(&key).arg(secs).query::<()>(conn)?;
            }
            Ok(next)
        });

        match result {
            Err(CacheError::NotAnInteger(_)) => Err(CacheError::NotAnInteger(key)),
            other => other,
        }
    }
}

fn connection_info(config: &RedisConfig) -> CacheResult<ConnectionInfo> {
    let addr = match &config.endpoint {
        Endpoint::Tcp { host, port } => ConnectionAddr::Tcp(host.clone(), *port),
        #[cfg(unix)]
        Endpoint::Unix(path) => ConnectionAddr::Unix(path.clone()),
        #[cfg(not(unix))]
        Endpoint::Unix(path) => {
            return Err(CacheError::Configuration(format!(
                "unix socket `{}` is not supported on this platform",
                path.display()
            )))
        }
    };

    Ok(ConnectionInfo {
        addr,
        redis: RedisConnectionInfo {
            db: config.database,
            password: config.password.clone(),
            ..Default::default()
        },
    })
}

/// Opens a connection, including AUTH and SELECT.
fn open(
    info: &ConnectionInfo,
    endpoint: &Endpoint,
    timeout: Option<Duration>,
) -> CacheResult<redis::Connection> {
    let connect = || -> RedisResult<redis::Connection> {
        let client = redis::Client::open(info.clone())?;
        let conn = match timeout {
            Some(timeout) => client.get_connection_with_timeout(timeout)?,
            None => client.get_connection()?,
        };
        conn.set_read_timeout(timeout)?;
        conn.set_write_timeout(timeout)?;
        Ok(conn)
    };

    connect().map_err(|e| CacheError::Connection(format!("redis at {}: {}", endpoint, e)))
}

/// Maps the server's "not an integer" reply onto [`CacheError::NotAnInteger`].
fn map_redis_error(err: redis::RedisError) -> CacheError {
    if err.to_string().contains("not an integer") {
        CacheError::NotAnInteger(String::new())
    } else {
        err.into()
    }
}

/// Escapes glob metacharacters so a prefix matches literally in `KEYS`.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl CacheStore for RedisEngine {
    fn write(&self, key: &str, value: Value) -> bool {
        let key = self.keys.key(key);
        let data = match Codec::encode(&value) {
            Ok(data) => data,
            Err(e) => {
                warn!(key = %key, error = %e, engine = "redis", "Cache SET failed");
                return false;
            }
        };

        let ttl = self.ttl.backend_seconds();
        let result = self.with_conn(|conn| match ttl {
            Some(secs) => redis::cmd("SETEX")
                .arg(&key)
                .arg(secs)
                .arg(data.as_slice())
                .query::<()>(conn),
            None => redis::cmd("SET").arg(&key).arg(data.as_slice()).query::<()>(conn),
        });

        match result {
            Ok(()) => {
                debug!(key = %key, ttl_seconds = ?ttl, engine = "redis", "Cache SET");
                true
            }
            Err(e) => {
                warn!(key = %key, error = %e, engine = "redis", "Cache SET failed");
                false
            }
        }
    }

    fn read(&self, key: &str) -> Option<Value> {
        let key = self.keys.key(key);
        let fetched = self.with_conn(|conn| redis::cmd("GET").arg(&key).query::<Option<Vec<u8>>>(conn));
        let data = match fetched {
            Ok(data) => data,
            Err(e) => {
                warn!(key = %key, error = %e, engine = "redis", "Cache GET failed");
                return None;
            }
        };

        let Some(data) = data else {
            debug!(key = %key, engine = "redis", "Cache MISS");
            return None;
        };

        match Codec::decode(&data) {
            Ok(value) => {
                debug!(key = %key, engine = "redis", "Cache HIT");
                Some(value)
            }
            Err(e) => {
                warn!(key = %key, error = %e, engine = "redis", "Corrupt cache entry");
                None
            }
        }
    }

    fn exists(&self, key: &str) -> bool {
        let key = self.keys.key(key);
        self.with_conn(|conn| redis::cmd("EXISTS").arg(&key).query::<bool>(conn))
            .unwrap_or_else(|e| {
                warn!(key = %key, error = %e, engine = "redis", "Cache EXISTS failed");
                false
            })
    }

    fn delete(&self, key: &str) -> bool {
        let key = self.keys.key(key);
        match self.with_conn(|conn| redis::cmd("DEL").arg(&key).query::<u64>(conn)) {
            Ok(removed) => {
                debug!(key = %key, removed = removed, engine = "redis", "Cache DEL");
                removed > 0
            }
            Err(e) => {
                warn!(key = %key, error = %e, engine = "redis", "Cache DEL failed");
                false
            }
        }
    }

    fn clear(&self) -> bool {
        let pattern = format!("{}*", escape_glob(self.keys.prefix()));
        let listed = self.with_conn(|conn| redis::cmd("KEYS").arg(&pattern).query::<Vec<String>>(conn));
        let keys = match listed {
            Ok(keys) => keys,
            Err(e) => {
                warn!(pattern = %pattern, error = %e, engine = "redis", "Cache KEYS failed");
                return false;
            }
        };

        let mut ok = true;
        for key in &keys {
            if let Err(e) = self.with_conn(|conn| redis::cmd("DEL").arg(key).query::<()>(conn)) {
                warn!(key = %key, error = %e, engine = "redis", "Cache DEL failed");
                ok = false;
            }
        }

        debug!(pattern = %pattern, removed = keys.len(), engine = "redis", "Cache CLEAR");
        ok
    }

    fn increment(&self, key: &str, offset: i64) -> CacheResult<i64> {
        self.counter("INCRBY", key, offset)
    }

    fn decrement(&self, key: &str, offset: i64) -> CacheResult<i64> {
        self.counter("DECRBY", key, offset)
    }

    fn engine_name(&self) -> &'static str {
        "redis"
    }
}
