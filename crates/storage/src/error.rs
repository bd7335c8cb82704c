//! Error types for the dual-backed batch writer.

use thiserror::Error;

/// Errors that can occur while routing, buffering or committing writes.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The key does not match any known table layout.
    #[error("unsupported key layout: 0x{0}")]
    UnsupportedTable(String),

    /// The relational transaction was already committed or rolled back.
    #[error("no open transaction; reset the batch before reuse")]
    TransactionClosed,

    /// Relational store error.
    #[error("relational store: {0}")]
    Sql(#[from] rusqlite::Error),

    /// Embedded store or sink error.
    #[error("key-value store: {0}")]
    Kv(String),

    /// A replay cache key failed to decode back into bytes.
    #[error("replay cache key is not valid hex: {0}")]
    InvalidCacheKey(#[from] hex::FromHexError),
}

impl StorageError {
    pub(crate) fn unsupported(key: &[u8]) -> Self {
        StorageError::UnsupportedTable(hex::encode(key))
    }
}
