//! Build error taxonomy
//!
//! Recoverable conditions (bad manifest lines, unreadable sequence files,
//! scratch I/O) are absorbed at stage boundaries with diagnostics and never
//! surface here. `BuildError` covers only the conditions that terminate a
//! build.

use std::io;

use thiserror::Error;

/// Fatal errors surfaced by the build pipeline.
#[derive(Error, Debug)]
pub enum BuildError {
    /// Underlying I/O failure on an essential path (scratch directory,
    /// output archive).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A bin rejected a fingerprint after exhausting its eviction budget.
    /// The filter can no longer guarantee recall, so the build aborts.
    #[error("filter bin {bin} rejected a fingerprint after {evictions} evictions")]
    FilterFull {
        /// Bin index that overflowed.
        bin: u64,
        /// Eviction hops attempted before giving up.
        evictions: usize,
    },

    /// Archive bytes do not describe a valid index.
    #[error("invalid archive: {0}")]
    InvalidArchive(String),
}
