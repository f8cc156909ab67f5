//! Null Engine
//!
//! Accepts everything and stores nothing. The registry hands it out while
//! caching is disabled so call sites behave the same either way.

use crate::engine::CacheStore;
use crate::error::CacheResult;
use crate::value::Value;

#[derive(Debug, Clone, Copy, Default)]
pub struct NullEngine;

impl NullEngine {
    pub fn new() -> Self {
        NullEngine
    }
}

impl CacheStore for NullEngine {
    fn write(&self, _key: &str, _value: Value) -> bool {
        true
    }

    fn read(&self, _key: &str) -> Option<Value> {
        None
    }

    fn exists(&self, _key: &str) -> bool {
        false
    }

    fn delete(&self, _key: &str) -> bool {
        true
    }

    fn clear(&self) -> bool {
        false
    }

    /// Reports the result of applying `offset` to a missing key.
    fn increment(&self, _key: &str, offset: i64) -> CacheResult<i64> {
        Ok(offset)
    }

    fn decrement(&self, _key: &str, offset: i64) -> CacheResult<i64> {
        crate::engine::negate(offset)
    }

    fn engine_name(&self) -> &'static str {
        "null"
    }
}
