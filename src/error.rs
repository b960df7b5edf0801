//! Error types for cowkv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for cowkv operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Size Limit Errors (rejected before any page is touched)
    // -------------------------------------------------------------------------
    #[error("Key too large: {len} bytes (max {max})")]
    KeyTooLarge { len: usize, max: usize },

    #[error("Value too large: {len} bytes (max {max})")]
    ValueTooLarge { len: usize, max: usize },

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KvError {
    /// Whether this error is a size-limit rejection (store state unchanged)
    pub fn is_size_limit(&self) -> bool {
        matches!(self, KvError::KeyTooLarge { .. } | KvError::ValueTooLarge { .. })
    }
}
