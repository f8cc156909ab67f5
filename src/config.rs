//! Cache configuration
//!
//! Two layers:
//!
//! - [`CacheConfig`] is the loose record callers register under a cache name.
//!   It deserializes from TOML/JSON/YAML and every field except `engine` is
//!   optional.
//! - [`MemoryConfig`], [`FileConfig`], [`RedisConfig`] and [`MemcachedConfig`]
//!   are the validated, fully defaulted settings an engine is actually built
//!   from. They are derived from the record exactly once, at construction.
//!
//! ## Example
//!
//! ```toml
//! [default]
//! engine = "file"
//! path = "/var/cache/app"
//! duration = "+1 hour"
//!
//! [sessions]
//! engine = "redis"
//! host = "10.0.0.5"
//! prefix = "sess_"
//! persistent = true
//! ```

use crate::duration::{CacheDuration, Ttl};
use crate::error::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix used by the file and network engines when none is configured
pub const DEFAULT_PREFIX: &str = "cache_";

/// TTL used by the file and network engines when none is configured
pub const DEFAULT_DURATION_SECS: u64 = 3600;

/// Permission bits applied to newly created cache files
pub const DEFAULT_FILE_MODE: u32 = 0o664;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_REDIS_PORT: u16 = 6379;
pub const DEFAULT_MEMCACHED_PORT: u16 = 11211;

/// Connection id used when `persistent = true`
pub const DEFAULT_PERSISTENT_ID: &str = "cachekv";

/// Environment prefix for overrides: `CACHEKV__<NAME>__<FIELD>`
pub const ENV_PREFIX: &str = "CACHEKV";

/// `persistent` accepts a flag or an explicit connection id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Persistent {
    Flag(bool),
    Id(String),
}

impl Persistent {
    /// The pool id this setting selects, if any.
    pub fn id(&self) -> Option<String> {
        match self {
            Persistent::Flag(true) => Some(DEFAULT_PERSISTENT_ID.to_string()),
            Persistent::Flag(false) => None,
            Persistent::Id(id) if id.is_empty() => None,
            Persistent::Id(id) => Some(id.clone()),
        }
    }
}

/// A named cache configuration record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Engine kind: `memory` (alias `array`), `file`, `null`, `redis`, `memcached`
    pub engine: String,
    pub prefix: Option<String>,
    pub duration: Option<CacheDuration>,
    /// File engine only: store values through the codec (default true)
    pub serialize: Option<bool>,
    /// File engine directory, or unix socket path for network engines
    pub path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
    /// Redis logical database
    pub database: Option<i64>,
    /// Connect and I/O timeout in seconds for network engines
    pub timeout: Option<u64>,
    /// File engine permission bits for new files
    pub mode: Option<u32>,
    pub persistent: Option<Persistent>,
}

impl CacheConfig {
    pub fn new(engine: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            prefix: None,
            duration: None,
            serialize: None,
            path: None,
            host: None,
            port: None,
            password: None,
            database: None,
            timeout: None,
            mode: None,
            persistent: None,
        }
    }

    pub fn memory() -> Self {
        Self::new("memory")
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new("file").with_path(path)
    }

    pub fn redis() -> Self {
        Self::new("redis")
    }

    pub fn memcached() -> Self {
        Self::new("memcached")
    }

    pub fn null() -> Self {
        Self::new("null")
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_duration(mut self, duration: impl Into<CacheDuration>) -> Self {
        self.duration = Some(duration.into());
        self
    }

    pub fn with_seconds(mut self, secs: u64) -> Self {
        self.duration = Some(CacheDuration::Seconds(secs));
        self
    }

    pub fn with_serialize(mut self, serialize: bool) -> Self {
        self.serialize = Some(serialize);
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_database(mut self, database: i64) -> Self {
        self.database = Some(database);
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(secs);
        self
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_persistent(mut self, persistent: Persistent) -> Self {
        self.persistent = Some(persistent);
        self
    }

    fn prefix_or(&self, default: &str) -> String {
        self.prefix.clone().unwrap_or_else(|| default.to_string())
    }

    fn ttl_or_default(&self) -> CacheResult<Ttl> {
        Ttl::from_config(self.duration.as_ref(), Ttl::seconds(DEFAULT_DURATION_SECS))
    }

    fn timeout_duration(&self) -> Option<Duration> {
        self.timeout.filter(|secs| *secs > 0).map(Duration::from_secs)
    }
}

/// Where a network engine connects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

impl Endpoint {
    /// A socket `path` takes precedence over host/port.
    fn from_record(record: &CacheConfig, default_port: u16) -> CacheResult<Self> {
        if let Some(path) = &record.path {
            if cfg!(not(unix)) {
                return Err(CacheError::Configuration(format!(
                    "unix socket `{}` is not supported on this platform",
                    path.display()
                )));
            }
            return Ok(Endpoint::Unix(path.clone()));
        }

        let host = record
            .host
            .clone()
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        if host.is_empty() {
            return Err(CacheError::Configuration("host must not be empty".to_string()));
        }

        Ok(Endpoint::Tcp {
            host,
            port: record.port.unwrap_or(default_port),
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Settings for the in-memory engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryConfig {
    pub prefix: String,
}

impl MemoryConfig {
    pub fn from_record(record: &CacheConfig) -> CacheResult<Self> {
        Ok(Self {
            prefix: record.prefix_or(""),
        })
    }
}

/// Settings for the file engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileConfig {
    pub path: PathBuf,
    pub prefix: String,
    pub ttl: Ttl,
    pub serialize: bool,
    pub mode: u32,
}

impl FileConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            prefix: DEFAULT_PREFIX.to_string(),
            ttl: Ttl::seconds(DEFAULT_DURATION_SECS),
            serialize: true,
            mode: DEFAULT_FILE_MODE,
        }
    }

    pub fn from_record(record: &CacheConfig) -> CacheResult<Self> {
        let path = record.path.clone().ok_or_else(|| {
            CacheError::Configuration("file engine requires a `path`".to_string())
        })?;
        if !path.is_dir() {
            return Err(CacheError::Configuration(format!(
                "cache directory `{}` does not exist",
                path.display()
            )));
        }

        let prefix = record.prefix_or(DEFAULT_PREFIX);
        if prefix.contains(['/', '\\', '\0']) {
            return Err(CacheError::Configuration(format!(
                "file prefix `{}` must not contain path separators",
                prefix
            )));
        }

        Ok(Self {
            path,
            prefix,
            ttl: record.ttl_or_default()?,
            serialize: record.serialize.unwrap_or(true),
            mode: record.mode.unwrap_or(DEFAULT_FILE_MODE),
        })
    }
}

/// Settings for the Redis engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub endpoint: Endpoint,
    pub password: Option<String>,
    pub database: i64,
    pub timeout: Option<Duration>,
    pub prefix: String,
    pub ttl: Ttl,
    pub persistent: Option<String>,
}

impl RedisConfig {
    pub fn from_record(record: &CacheConfig) -> CacheResult<Self> {
        Ok(Self {
            endpoint: Endpoint::from_record(record, DEFAULT_REDIS_PORT)?,
            password: record.password.clone().filter(|p| !p.is_empty()),
            database: record.database.unwrap_or(0),
            timeout: record.timeout_duration(),
            prefix: record.prefix_or(DEFAULT_PREFIX),
            ttl: record.ttl_or_default()?,
            persistent: record.persistent.as_ref().and_then(Persistent::id),
        })
    }
}

/// Settings for the memcached engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemcachedConfig {
    pub endpoint: Endpoint,
    pub timeout: Option<Duration>,
    pub prefix: String,
    pub ttl: Ttl,
    pub persistent: Option<String>,
}

impl MemcachedConfig {
    pub fn from_record(record: &CacheConfig) -> CacheResult<Self> {
        let prefix = record.prefix_or(DEFAULT_PREFIX);
        if prefix.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(CacheError::Configuration(format!(
                "memcached prefix `{}` must not contain whitespace",
                prefix.escape_debug()
            )));
        }

        Ok(Self {
            endpoint: Endpoint::from_record(record, DEFAULT_MEMCACHED_PORT)?,
            timeout: record.timeout_duration(),
            prefix,
            ttl: record.ttl_or_default()?,
            persistent: record.persistent.as_ref().and_then(Persistent::id),
        })
    }
}

/// Loads a name -> [`CacheConfig`] mapping from a TOML/JSON/YAML file.
///
/// Environment variables of the form `CACHEKV__<NAME>__<FIELD>` override
/// fields from the file, e.g. `CACHEKV__DEFAULT__PREFIX=app_`.
pub fn load_cache_configs(path: impl AsRef<Path>) -> CacheResult<HashMap<String, CacheConfig>> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path.as_ref()))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
