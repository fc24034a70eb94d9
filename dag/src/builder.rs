//! DAG construction: chunking and balanced tree assembly.

use crate::error::DagError;
use crate::node::{node_key, DagNode, Link, NodeType};
use crate::pool;
use gossamer_storage::{BlobStore, Kv, KvHandle};
use prost::Message;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Fixed leaf chunk size.
pub const CHUNK_SIZE: usize = 256 * 1024;

/// Maximum children per interior node.
pub const MAX_LINKS_PER_NODE: usize = 174;

/// Builds content-addressed DAGs from byte streams.
pub struct DagBuilder {
    kv: KvHandle,
    blobs: Arc<BlobStore>,
}

impl DagBuilder {
    /// Create a builder over the given stores.
    pub fn new(kv: KvHandle, blobs: Arc<BlobStore>) -> Self {
        Self { kv, blobs }
    }

    /// Chunk `reader` into 256 KiB leaves, persist them, and assemble the
    /// tree. Returns the hex root hash naming the whole stream.
    pub async fn create_dag<R>(&self, mut reader: R) -> Result<String, DagError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = pool::get_chunk_buffer();
        let mut links: Vec<Link> = Vec::new();

        loop {
            let n = read_full(&mut reader, &mut buf).await?;
            if n > 0 {
                let chunk = &buf[..n];
                let hash = hex::encode(Sha256::digest(chunk));
                self.blobs.store_block(&hash, chunk).await?;
                links.push(Link::chunk(hash, n as u64));
            }
            if n < CHUNK_SIZE {
                break;
            }
        }

        debug!("chunked stream into {} leaves", links.len());
        self.build_tree(links, NodeType::File).await
    }

    /// Assemble a balanced tree over leaf links. A single link collapses to
    /// its own hash with no wrapping node.
    pub(crate) async fn build_tree(
        &self,
        mut links: Vec<Link>,
        node_type: NodeType,
    ) -> Result<String, DagError> {
        loop {
            if links.len() == 1 {
                return Ok(links.swap_remove(0).hash);
            }

            if links.len() <= MAX_LINKS_PER_NODE {
                return self.store_interior(&links, node_type).await;
            }

            let mut parents = Vec::with_capacity(links.len().div_ceil(MAX_LINKS_PER_NODE));
            for group in links.chunks(MAX_LINKS_PER_NODE) {
                let hash = self.store_interior(group, node_type).await?;
                let tsize = group.iter().map(|l| l.tsize).sum();
                parents.push(Link::chunk(hash, tsize));
            }
            links = parents;
        }
    }

    /// Persist one interior node; `tsize` of the node is the sum of its
    /// children and `blocksizes` mirrors the children in order.
    async fn store_interior(
        &self,
        links: &[Link],
        node_type: NodeType,
    ) -> Result<String, DagError> {
        let mut proto_links = Vec::with_capacity(links.len());
        let mut blocksizes = Vec::with_capacity(links.len());
        let mut filesize = 0u64;
        for link in links {
            proto_links.push(link.to_proto()?);
            blocksizes.push(link.tsize);
            filesize += link.tsize;
        }

        let node = DagNode {
            node_type: node_type as i32,
            data: Vec::new(),
            links: proto_links,
            filesize,
            blocksizes,
        };

        let bytes = node.encode_to_vec();
        let hash_hex = hex::encode(Sha256::digest(&bytes));
        self.kv.put(&node_key(&hash_hex)?, &bytes).await?;

        Ok(hash_hex)
    }
}

/// Fill `buf` from the reader, short only at end of stream.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize, DagError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gossamer_storage::{Kv, MemoryKv};
    use tempfile::TempDir;

    async fn test_builder() -> (DagBuilder, KvHandle, Arc<BlobStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let kv: KvHandle = Arc::new(MemoryKv::new());
        let blobs = Arc::new(BlobStore::open(dir.path()).await.unwrap());
        (
            DagBuilder::new(Arc::clone(&kv), Arc::clone(&blobs)),
            kv,
            blobs,
            dir,
        )
    }

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_single_chunk_root_is_leaf() {
        let (builder, kv, blobs, _dir) = test_builder().await;

        let data = patterned(1000);
        let root = builder.create_dag(data.as_slice()).await.unwrap();

        assert_eq!(root, hex::encode(Sha256::digest(&data)));
        assert!(blobs.has_block(&root).await.unwrap());
        // No interior node was written.
        assert!(kv
            .scan_prefix(crate::node::DAG_NODE_PREFIX)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_multi_chunk_interior_invariants() {
        let (builder, kv, _blobs, _dir) = test_builder().await;

        let data = patterned(3 * CHUNK_SIZE + 12345);
        let root = builder.create_dag(data.as_slice()).await.unwrap();

        let stored = kv.get(&node_key(&root).unwrap()).await.unwrap().unwrap();
        let node = DagNode::decode(stored.as_slice()).unwrap();

        assert_eq!(node.links.len(), 4);
        assert_eq!(node.filesize, data.len() as u64);
        assert_eq!(node.blocksizes.iter().sum::<u64>(), node.filesize);
        assert_eq!(
            node.links.iter().map(|l| l.tsize).sum::<u64>(),
            node.filesize
        );
        assert_eq!(node.blocksizes[3], 12345);
    }

    #[tokio::test]
    async fn test_empty_input_builds_empty_root() {
        let (builder, kv, _blobs, _dir) = test_builder().await;

        let root = builder.create_dag(&b""[..]).await.unwrap();
        let stored = kv.get(&node_key(&root).unwrap()).await.unwrap().unwrap();
        let node = DagNode::decode(stored.as_slice()).unwrap();

        assert!(node.links.is_empty());
        assert_eq!(node.filesize, 0);
    }

    #[tokio::test]
    async fn test_fan_out_limit_splits_levels() {
        let (builder, kv, _blobs, _dir) = test_builder().await;

        // 400 synthetic leaves force two tree levels: ceil(400/174) = 3
        // interior nodes plus one root.
        let links: Vec<Link> = (0..400u32)
            .map(|i| {
                let mut hash = [0u8; 32];
                hash[..4].copy_from_slice(&i.to_be_bytes());
                Link::chunk(hex::encode(hash), 1)
            })
            .collect();

        let root = builder.build_tree(links, NodeType::File).await.unwrap();

        let stored = kv.get(&node_key(&root).unwrap()).await.unwrap().unwrap();
        let root_node = DagNode::decode(stored.as_slice()).unwrap();

        assert_eq!(root_node.links.len(), 3);
        assert_eq!(root_node.filesize, 400);
        assert_eq!(root_node.links[0].tsize, 174);
        assert_eq!(root_node.links[1].tsize, 174);
        assert_eq!(root_node.links[2].tsize, 52);

        for link in &root_node.links {
            let child_key = node_key(&hex::encode(&link.hash)).unwrap();
            let child = DagNode::decode(
                kv.get(&child_key).await.unwrap().unwrap().as_slice(),
            )
            .unwrap();
            assert!(child.links.len() <= MAX_LINKS_PER_NODE);
            assert_eq!(child.filesize, link.tsize);
        }
    }

    #[tokio::test]
    async fn test_identical_content_identical_root() {
        let (builder, _kv, _blobs, _dir) = test_builder().await;

        let data = patterned(2 * CHUNK_SIZE);
        let root1 = builder.create_dag(data.as_slice()).await.unwrap();
        let root2 = builder.create_dag(data.as_slice()).await.unwrap();

        assert_eq!(root1, root2);
    }
}
