//! Crate-wide error types.
//!
//! Every subsystem owns a narrow `thiserror` enum. [`EngineError`] wraps all
//! of them via `#[from]` so the driver can propagate failures with `?`
//! while still exposing `value | not-found` to callers of `get` (a missing
//! key is `Ok(None)`, never an `Err`).

use std::io;

use thiserror::Error;

/// Errors returned by [`crate::bloom::BloomFilter`] operations.
#[derive(Debug, Error)]
pub enum BloomError {
    /// Underlying I/O failure while serializing or deserializing the filter.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The on-disk header or bit array was truncated or malformed.
    #[error("malformed bloom filter file: {0}")]
    Malformed(String),
}

/// Errors returned by [`crate::skiplist::SkipList`] operations.
#[derive(Debug, Error)]
pub enum SkipListError {
    /// `delete`/lookup was attempted for a key that is not present.
    #[error("key not present")]
    KeyNotPresent,
}

/// Errors returned by [`crate::cache::LruCache`] operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// `LruCache::new` was called with a non-positive capacity.
    #[error("cache capacity must be greater than 0")]
    InvalidCapacity,
}

/// Errors returned by [`crate::wal::Wal`] operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The active segment counter would roll past `9999`.
    #[error("WAL segment counter overflow: maximum of 9999 segments reached")]
    SegmentOverflow,

    /// A record read back from a segment was shorter than its header claims.
    #[error("corrupt WAL record: {0}")]
    Corrupt(String),
}

/// Errors returned by [`crate::sstable`] operations.
#[derive(Debug, Error)]
pub enum SSTableError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A bloom filter operation failed while building or reading a table.
    #[error("bloom filter error: {0}")]
    Bloom(#[from] BloomError),

    /// A record's on-disk encoding was shorter than its header claims.
    #[error("corrupt SSTable record: {0}")]
    Corrupt(String),
}

/// Errors returned by [`crate::compaction`] and [`crate::lsm`] operations.
#[derive(Debug, Error)]
pub enum CompactionError {
    /// Underlying I/O failure (directory creation, file open, rename).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Reading or writing one of the two source tables failed.
    #[error("SSTable error: {0}")]
    SSTable(#[from] SSTableError),
}

/// Errors returned while loading [`crate::config::EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure reading the configuration file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The configuration file could not be parsed.
    #[error("malformed configuration: {0}")]
    Malformed(String),
}

/// Top-level error type returned by [`crate::engine::Engine`] operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// I/O failure not otherwise classified.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// WAL append or recovery failure. The only fatal path on the write side.
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),

    /// SSTable read/write failure.
    #[error("SSTable error: {0}")]
    SSTable(#[from] SSTableError),

    /// Compaction failure.
    #[error("compaction error: {0}")]
    Compaction(#[from] CompactionError),

    /// Cache construction failure (non-positive capacity in config).
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Configuration load failure.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}
