//! Content-addressed Merkle DAG over the gossamer storage layer.
//!
//! Arbitrary byte streams are chunked into fixed 256 KiB leaves stored in
//! the blob store, then assembled into a balanced tree of interior nodes
//! (fan-out 174) persisted in the key-value store. The root hash names the
//! whole blob; [`DagReader`] gives sequential and random access back over
//! the logical stream.
//!
//! A DAG is immutable once built: every node is addressed by the SHA-256
//! of its serialized bytes, so any mutation produces a different root.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod error;
pub mod node;
pub mod pool;
pub mod reader;

pub use builder::{DagBuilder, CHUNK_SIZE, MAX_LINKS_PER_NODE};
pub use error::DagError;
pub use node::{node_key, DagLink, DagNode, Link, NodeType, DAG_NODE_PREFIX};
pub use reader::DagReader;
