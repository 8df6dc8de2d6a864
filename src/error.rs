//! Error taxonomy for the cache core.
//!
//! Variants map onto the error kinds in the design: a request-shape problem,
//! a content-integrity failure, a blob too large for the configured limits,
//! a soft load-shedding rejection, transient I/O, a cancelled fan-out, and
//! an internal invariant violation that should be logged but never panics.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("integrity failure: {0}")]
    IntegrityFailure(String),

    #[error("blob too large: {0}")]
    Oversize(String),

    #[error("cache too small to hold {wanted} bytes (max {max})")]
    CacheTooSmall { wanted: u64, max: u64 },

    #[error("insufficient storage: load shed under disk size limit")]
    LoadShedding,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("not found")]
    NotFound,

    #[error("internal invariant violation: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl CacheError {
    /// True for errors that should be logged loudly but never crash the process.
    pub fn is_internal(&self) -> bool {
        matches!(self, CacheError::Internal(_))
    }
}
