use thiserror::Error;

/// Main error type for cache operations
///
/// The public cache surface reports outcomes as `bool`/`Option` (a value that
/// cannot be cached is never a hard failure); this type is the currency of the
/// codec, disk store and configuration internals.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
