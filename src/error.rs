//! Cache error types
//!
//! Only construction-time problems and counter operations surface as errors.
//! Ordinary read/write/delete failures are reported as `false` or a miss by the
//! engines themselves, so a broken cache never takes the caller down with it.

use thiserror::Error;

/// Errors that can occur while building or using a cache engine.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Unknown cache name, unknown engine kind or an invalid configuration field
    #[error("cache configuration error: {0}")]
    Configuration(String),

    /// A network engine could not reach its backend at construction time
    #[error("cache connection error: {0}")]
    Connection(String),

    /// The engine cannot perform the requested operation
    #[error("unsupported cache operation: {0}")]
    UnsupportedOperation(String),

    /// A counter operation hit a stored value that is not an integer
    #[error("cached value for `{0}` is not an integer")]
    NotAnInteger(String),

    /// A value could not be encoded or decoded
    #[error("cache serialization error: {0}")]
    Serialization(String),

    /// The backend rejected or failed an operation
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Backend(format!("redis: {}", err))
    }
}

impl From<bincode::Error> for CacheError {
    fn from(err: bincode::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for CacheError {
    fn from(err: config::ConfigError) -> Self {
        CacheError::Configuration(err.to_string())
    }
}
