//! Cache Registry
//!
//! Resolves cache names to engines. Engines are built on first use from the
//! registered [`CacheConfig`] and memoized for the lifetime of the registry.
//!
//! ## Disabling
//!
//! [`CacheRegistry::disable`] redirects every lookup to one shared Null engine
//! without discarding the engines already built. [`CacheRegistry::enable`]
//! drops the override, so data written before the switch becomes visible again.
//!
//! ## Example
//!
//! ```
//! use cachekv::{CacheConfig, CacheRegistry};
//!
//! let registry = CacheRegistry::new();
//! registry.configure("default", CacheConfig::memory()).unwrap();
//!
//! registry.write("default", "answer", 42).unwrap();
//! assert_eq!(registry.increment("default", "answer", 1).unwrap(), 43);
//!
//! registry.disable();
//! assert!(registry.read("default", "answer").unwrap().is_none());
//!
//! registry.enable();
//! assert!(registry.exists("default", "answer").unwrap());
//! ```

use crate::config::{load_cache_configs, CacheConfig};
use crate::connection::SharedConnections;
use crate::engine::{Engine, NullEngine};
use crate::error::{CacheError, CacheResult};
use crate::value::Value;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Name used when callers do not pick a cache.
pub const DEFAULT_CACHE: &str = "default";

#[derive(Default)]
struct RegistryState {
    configs: HashMap<String, CacheConfig>,
    loaded: HashMap<String, Arc<Engine>>,
    /// Set while caching is disabled
    null_override: Option<Arc<Engine>>,
}

/// Name-to-engine resolver with memoization and a global disable switch.
#[derive(Default)]
pub struct CacheRegistry {
    state: Mutex<RegistryState>,
    connections: SharedConnections,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with a set of named configurations.
    pub fn with_configs(configs: HashMap<String, CacheConfig>) -> Self {
        let registry = Self::new();
        registry.state.lock().configs = configs;
        registry
    }

    /// Loads named configurations from a file (see [`load_cache_configs`]).
    pub fn from_file(path: impl AsRef<Path>) -> CacheResult<Self> {
        let configs = load_cache_configs(path)?;
        Ok(Self::with_configs(configs))
    }

    /// Registers or replaces the configuration for `name`.
    ///
    /// Fails once an engine has been built for `name`; the engine keeps the
    /// configuration it was built from.
    pub fn configure(&self, name: impl Into<String>, config: CacheConfig) -> CacheResult<()> {
        let name = name.into();
        let mut state = self.state.lock();

        if state.loaded.contains_key(&name) {
            return Err(CacheError::Configuration(format!(
                "cache `{}` is already in use and cannot be reconfigured",
                name
            )));
        }

        debug!(cache = %name, engine = %config.engine, "Cache configured");
        state.configs.insert(name, config);
        Ok(())
    }

    /// The configuration registered under `name`.
    pub fn config(&self, name: &str) -> Option<CacheConfig> {
        self.state.lock().configs.get(name).cloned()
    }

    /// Returns the engine for `name`, building it on first use.
    ///
    /// While disabled every name resolves to the shared Null engine, even
    /// names that were never configured.
    pub fn resolve(&self, name: &str) -> CacheResult<Arc<Engine>> {
        let mut state = self.state.lock();

        if let Some(null) = &state.null_override {
            return Ok(Arc::clone(null));
        }

        if let Some(engine) = state.loaded.get(name) {
            return Ok(Arc::clone(engine));
        }

        let config = state.configs.get(name).ok_or_else(|| {
            CacheError::Configuration(format!("cache configuration `{}` does not exist", name))
        })?;

        let engine = Arc::new(Engine::build(config, &self.connections)?);
        info!(cache = name, engine = engine.engine_name(), "Cache engine built");

        state.loaded.insert(name.to_string(), Arc::clone(&engine));
        Ok(engine)
    }

    /// Redirects every lookup to the Null engine.
    pub fn disable(&self) {
        let mut state = self.state.lock();
        if state.null_override.is_none() {
            state.null_override = Some(Arc::new(Engine::Null(NullEngine::new())));
            info!("Caching disabled");
        }
    }

    /// Restores lookups to the real engines.
    pub fn enable(&self) {
        if self.state.lock().null_override.take().is_some() {
            info!("Caching enabled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().null_override.is_none()
    }

    /// Names with a built engine, sorted.
    pub fn loaded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().loaded.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn write(&self, name: &str, key: &str, value: impl Into<Value>) -> CacheResult<bool> {
        Ok(self.resolve(name)?.write(key, value))
    }

    pub fn read(&self, name: &str, key: &str) -> CacheResult<Option<Value>> {
        Ok(self.resolve(name)?.read(key))
    }

    pub fn exists(&self, name: &str, key: &str) -> CacheResult<bool> {
        Ok(self.resolve(name)?.exists(key))
    }

    pub fn delete(&self, name: &str, key: &str) -> CacheResult<bool> {
        Ok(self.resolve(name)?.delete(key))
    }

    pub fn clear(&self, name: &str) -> CacheResult<bool> {
        Ok(self.resolve(name)?.clear())
    }

    pub fn increment(&self, name: &str, key: &str, offset: i64) -> CacheResult<i64> {
        self.resolve(name)?.increment(key, offset)
    }

    pub fn decrement(&self, name: &str, key: &str, offset: i64) -> CacheResult<i64> {
        self.resolve(name)?.decrement(key, offset)
    }
}

impl fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        let mut configured: Vec<&String> = state.configs.keys().collect();
        configured.sort();
        f.debug_struct("CacheRegistry")
            .field("configured", &configured)
            .field("loaded", &state.loaded.len())
            .field("enabled", &state.null_override.is_none())
            .field("connections", &self.connections)
            .finish()
    }
}
