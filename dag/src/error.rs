//! DAG error types.

use thiserror::Error;

/// Errors from DAG construction and traversal.
#[derive(Error, Debug)]
pub enum DagError {
    /// Underlying storage failure
    #[error(transparent)]
    Storage(#[from] gossamer_storage::StorageError),

    /// Stored node bytes could not be decoded
    #[error("malformed dag node")]
    Decode(#[from] prost::DecodeError),

    /// A link hash was not valid hex
    #[error("invalid link hash: {0}")]
    InvalidHash(String),

    /// Seek or descent target beyond the logical stream
    #[error("offset out of range")]
    OffsetOutOfRange,

    /// Seek resolved to a negative position
    #[error("negative position")]
    NegativePosition,

    /// Stream I/O failure while chunking
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
