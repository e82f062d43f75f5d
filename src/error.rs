//! Error types for the temporal memory engine.
//!
//! This module provides a unified error type for all fallible operations in
//! the crate, using the `thiserror` crate for ergonomic error handling.

use thiserror::Error;

/// The main error type for temporal memory operations.
#[derive(Error, Debug)]
pub enum TmError {
    /// A constructor or parameter argument failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An index (column, cell, segment, synapse) fell outside its valid range.
    #[error("out of range: {what} {index} (valid range is 0..{length})")]
    OutOfRange {
        /// What kind of index this was (column, cell, segment, ...).
        what: &'static str,
        /// The offending index.
        index: usize,
        /// The valid length for that index space.
        length: usize,
    },

    /// A segment or synapse ID did not resolve to a live entry.
    #[error("not found: {what} {id}")]
    NotFound {
        /// What kind of entity was being looked up.
        what: &'static str,
        /// The ID that failed to resolve.
        id: u64,
    },

    /// Snapshot (de)serialization failed.
    #[error("serialization error: {0}")]
    SerializationError(#[from] bincode::Error),

    /// I/O error while reading or writing a snapshot.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for temporal memory operations.
pub type Result<T> = std::result::Result<T, TmError>;
