//! Memcached client
//!
//! The memcached engine talks to its server through [`MemcachedClient`], the
//! handful of commands it needs. The production implementation is the
//! blocking [`memcache::Client`]; its r2d2 pool makes it `Sync`, so one client
//! is shared by every engine built with the same persistent id.

use crate::config::Endpoint;
use crate::error::{CacheError, CacheResult};
use memcache::{CommandError, MemcacheError};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Commands the memcached engine issues.
pub trait MemcachedClient: Send + Sync {
    fn version(&self) -> CacheResult<String>;

    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Fetches the data and its CAS token.
    fn gets(&self, key: &str) -> CacheResult<Option<(Vec<u8>, u64)>>;

    fn set(&self, key: &str, data: &[u8], exptime: u32) -> CacheResult<()>;

    /// Stores `data` only if `key` is absent. An existing key is not an error.
    fn add(&self, key: &str, data: &[u8], exptime: u32) -> CacheResult<()>;

    /// Stores `data` if the item is unchanged since `gets` returned `cas`.
    /// Returns false if it changed or vanished.
    fn cas(&self, key: &str, data: &[u8], exptime: u32, cas: u64) -> CacheResult<bool>;

    fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Native `incr`. `None` when the key does not exist.
    fn increment(&self, key: &str, delta: u64) -> CacheResult<Option<u64>>;

    fn touch(&self, key: &str, exptime: u32) -> CacheResult<bool>;

    fn flush(&self) -> CacheResult<()>;
}

impl From<MemcacheError> for CacheError {
    fn from(err: MemcacheError) -> Self {
        CacheError::Backend(format!("memcached: {}", err))
    }
}

fn is_not_found(err: &MemcacheError) -> bool {
    matches!(err, MemcacheError::CommandError(CommandError::KeyNotFound))
}

fn is_exists(err: &MemcacheError) -> bool {
    matches!(err, MemcacheError::CommandError(CommandError::KeyExists))
}

/// Builds the `memcache://` URL for an endpoint.
pub fn endpoint_url(endpoint: &Endpoint, timeout: Option<Duration>) -> String {
    let mut url = match endpoint {
        Endpoint::Tcp { host, port } => format!("memcache://{}:{}?tcp_nodelay=true", host, port),
        Endpoint::Unix(path) => format!("memcache://{}?", path.display()),
    };
    if let Some(timeout) = timeout {
        if !url.ends_with('?') {
            url.push('&');
        }
        url.push_str(&format!("timeout={}", timeout.as_secs_f64()));
    }
    url.trim_end_matches('?').to_string()
}

/// Connects and checks the server answers `version`.
pub fn connect(endpoint: &Endpoint, timeout: Option<Duration>) -> CacheResult<memcache::Client> {
    let unreachable =
        |e: MemcacheError| CacheError::Connection(format!("memcached at {}: {}", endpoint, e));

    let client = memcache::Client::connect(endpoint_url(endpoint, timeout).as_str())
        .map_err(unreachable)?;
    let version = MemcachedClient::version(&client)
        .map_err(|e| CacheError::Connection(format!("memcached at {}: {}", endpoint, e)))?;

    debug!(endpoint = %endpoint, version = %version, "Memcached handshake");
    Ok(client)
}

impl MemcachedClient for memcache::Client {
    fn version(&self) -> CacheResult<String> {
        let versions = memcache::Client::version(self)?;
        versions
            .into_iter()
            .next()
            .map(|(_, version)| version)
            .ok_or_else(|| CacheError::Backend("memcached: no server answered `version`".into()))
    }

    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(memcache::Client::get::<Vec<u8>>(self, key)?)
    }

    fn gets(&self, key: &str) -> CacheResult<Option<(Vec<u8>, u64)>> {
        let mut found: HashMap<String, (Vec<u8>, u32, Option<u64>)> =
            memcache::Client::gets(self, &[key])?;

        match found.remove(key) {
            None => Ok(None),
            Some((data, _flags, Some(cas))) => Ok(Some((data, cas))),
            Some((_, _, None)) => Err(CacheError::Backend(format!(
                "memcached: no CAS token for `{}`",
                key
            ))),
        }
    }

    fn set(&self, key: &str, data: &[u8], exptime: u32) -> CacheResult<()> {
        Ok(memcache::Client::set(self, key, data, exptime)?)
    }

    fn add(&self, key: &str, data: &[u8], exptime: u32) -> CacheResult<()> {
        match memcache::Client::add(self, key, data, exptime) {
            Err(e) if !is_exists(&e) => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn cas(&self, key: &str, data: &[u8], exptime: u32, cas: u64) -> CacheResult<bool> {
        match memcache::Client::cas(self, key, data, exptime, cas) {
            Ok(stored) => Ok(stored),
            Err(e) if is_exists(&e) || is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, key: &str) -> CacheResult<bool> {
        match memcache::Client::delete(self, key) {
            Ok(removed) => Ok(removed),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn increment(&self, key: &str, delta: u64) -> CacheResult<Option<u64>> {
        match memcache::Client::increment(self, key, delta) {
            Ok(value) => Ok(Some(value)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) if e.to_string().contains("non-numeric") => {
                Err(CacheError::NotAnInteger(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn touch(&self, key: &str, exptime: u32) -> CacheResult<bool> {
        match memcache::Client::touch(self, key, exptime) {
            Ok(touched) => Ok(touched),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn flush(&self) -> CacheResult<()> {
        Ok(memcache::Client::flush(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_endpoint_url() {
        let tcp = Endpoint::Tcp {
            host: "10.0.0.5".to_string(),
            port: 11211,
        };
        assert_eq!(endpoint_url(&tcp, None), "memcache://10.0.0.5:11211?tcp_nodelay=true");
        assert_eq!(
            endpoint_url(&tcp, Some(Duration::from_millis(1500))),
            "memcache://10.0.0.5:11211?tcp_nodelay=true&timeout=1.5"
        );

        let unix = Endpoint::Unix(PathBuf::from("/run/memcached.sock"));
        assert_eq!(endpoint_url(&unix, None), "memcache:///run/memcached.sock");
        assert_eq!(
            endpoint_url(&unix, Some(Duration::from_secs(2))),
            "memcache:///run/memcached.sock?timeout=2"
        );
    }

    #[test]
    fn test_error_mapping() {
        let missing = MemcacheError::CommandError(CommandError::KeyNotFound);
        assert!(is_not_found(&missing));
        assert!(!is_exists(&missing));
        assert!(matches!(CacheError::from(missing), CacheError::Backend(_)));
    }
}
