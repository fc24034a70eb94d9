//! Persistence for gossamer: key-value store and blob store with pluggable backends.
//!
//! This crate provides the two storage faces the node core depends on: an
//! opaque byte-to-byte key-value mapping with prefix-range iteration, and a
//! filesystem block store addressing immutable blobs by content hash.
//!
//! ## Key layout
//!
//! The node keeps everything under typed prefixes in a single keyspace:
//!
//! - `secret:keys` — identity key material
//! - `saved:peers:<sha256(pub)>` — persisted peer directory entries
//! - `bans:peer:<hex(sha256(pub))>` — ban markers (presence means banned)
//! - `dag_node:<sha256(node)>` — interior Merkle DAG nodes

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod blob;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Data corruption detected
    #[error("data corruption: {0}")]
    Corruption(String),
    /// Entry not found
    #[error("entry not found")]
    NotFound,
    /// Invalid operation or argument
    #[error("invalid operation: {0}")]
    Invalid(String),
    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Opaque byte-to-byte key-value mapping with prefix iteration.
///
/// Implementations must be safe to share across tasks; no method holds a
/// lock across its await points longer than the operation itself.
#[async_trait]
pub trait Kv: Send + Sync {
    /// Read a value. `Ok(None)` when the key is absent.
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Insert or overwrite a value.
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// Remove a key. Removing an absent key is not an error.
    async fn delete(&self, key: &[u8]) -> Result<(), StorageError>;

    /// All `(key, value)` pairs whose key starts with `prefix`, in key order.
    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;
}

/// Shared handle to a key-value backend.
pub type KvHandle = Arc<dyn Kv>;

/// Key-value backend configuration.
#[derive(Clone, Debug)]
pub enum KvMode {
    /// In-memory store (dev/tests only)
    InMemory,
    /// Journaled file store rooted at a data directory
    File {
        /// Data directory path
        data_dir: std::path::PathBuf,
    },
}

/// Open a key-value backend from its configuration.
pub async fn open_kv(mode: KvMode) -> Result<KvHandle, StorageError> {
    match mode {
        KvMode::InMemory => Ok(Arc::new(backend::mem::MemoryKv::new())),
        KvMode::File { data_dir } => Ok(Arc::new(backend::file::FileKv::open(&data_dir).await?)),
    }
}

pub use backend::file::FileKv;
pub use backend::mem::MemoryKv;
pub use blob::BlobStore;
