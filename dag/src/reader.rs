//! Random-access reader over a built DAG.
//!
//! The reader walks the tree from the root on demand: sequential reads keep
//! a cursor into the leaf blob currently being drained, and a seek (or leaf
//! exhaustion) re-descends from the root to the leaf containing the target
//! offset. Whether a hash names an interior node or a leaf blob is decided
//! by its presence in the `dag_node:` keyspace.

use crate::error::DagError;
use crate::node::{node_key, DagNode};
use gossamer_storage::{BlobStore, Kv, KvHandle};
use prost::Message;
use std::io::SeekFrom;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Seekable reader over the logical stream named by a root hash.
pub struct DagReader {
    kv: KvHandle,
    blobs: Arc<BlobStore>,
    root_hash: String,
    size: u64,
    offset: u64,
    current: Option<File>,
}

impl DagReader {
    /// Open a reader for `root_hash`. The root may be an interior node or,
    /// for single-chunk streams, a bare leaf blob.
    pub async fn open(
        root_hash: &str,
        kv: KvHandle,
        blobs: Arc<BlobStore>,
    ) -> Result<Self, DagError> {
        let size = match kv.get(&node_key(root_hash)?).await? {
            Some(bytes) => DagNode::decode(bytes.as_slice())?.filesize,
            None => {
                let file = blobs.open_block(root_hash).await?;
                file.metadata().await?.len()
            }
        };

        Ok(Self {
            kv,
            blobs,
            root_hash: root_hash.to_string(),
            size,
            offset: 0,
            current: None,
        })
    }

    /// Logical stream length.
    pub fn len(&self) -> u64 {
        self.size
    }

    /// Whether the stream is empty.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Current read position.
    pub fn position(&self) -> u64 {
        self.offset
    }

    /// Read into `buf`, returning the number of bytes read. `Ok(0)` means
    /// end of stream.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, DagError> {
        if self.offset >= self.size {
            return Ok(0);
        }

        let mut filled = 0;
        while filled < buf.len() {
            if self.current.is_none() {
                if self.offset >= self.size {
                    break;
                }
                self.current = Some(self.descend(self.offset).await?);
            }

            let Some(file) = self.current.as_mut() else {
                break;
            };

            let n = file.read(&mut buf[filled..]).await?;
            if n == 0 {
                // Leaf exhausted; re-descend for the next one.
                self.current = None;
                continue;
            }

            filled += n;
            self.offset += n as u64;
        }

        Ok(filled)
    }

    /// Read the remainder of the stream.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>, DagError> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        Ok(out)
    }

    /// Reposition the stream. Negative targets and targets beyond the
    /// stream length are rejected; moving the position invalidates the
    /// current leaf cursor.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64, DagError> {
        let target: i64 = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(delta) => self.offset as i64 + delta,
            SeekFrom::End(delta) => self.size as i64 + delta,
        };

        if target < 0 {
            return Err(DagError::NegativePosition);
        }
        let target = target as u64;
        if target > self.size {
            return Err(DagError::OffsetOutOfRange);
        }

        if target != self.offset {
            self.current = None;
        }
        self.offset = target;
        Ok(target)
    }

    /// Walk from the root to the leaf containing `offset` and return a
    /// file positioned at the offset within that leaf.
    async fn descend(&self, offset: u64) -> Result<File, DagError> {
        let mut hash = self.root_hash.clone();
        let mut offset = offset;

        loop {
            match self.kv.get(&node_key(&hash)?).await? {
                None => {
                    // Leaf blob.
                    let mut file = self.blobs.open_block(&hash).await?;
                    if offset > 0 {
                        file.seek(SeekFrom::Start(offset)).await?;
                    }
                    return Ok(file);
                }
                Some(bytes) => {
                    let node = DagNode::decode(bytes.as_slice())?;

                    let mut cumulative = 0u64;
                    let mut next: Option<(String, u64)> = None;
                    for link in &node.links {
                        if offset < cumulative + link.tsize {
                            next = Some((hex::encode(&link.hash), offset - cumulative));
                            break;
                        }
                        cumulative += link.tsize;
                    }

                    match next {
                        Some((child, child_offset)) => {
                            hash = child;
                            offset = child_offset;
                        }
                        None => return Err(DagError::OffsetOutOfRange),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{DagBuilder, CHUNK_SIZE};
    use gossamer_storage::MemoryKv;
    use tempfile::TempDir;

    struct Fixture {
        builder: DagBuilder,
        kv: KvHandle,
        blobs: Arc<BlobStore>,
        _dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let kv: KvHandle = Arc::new(MemoryKv::new());
        let blobs = Arc::new(BlobStore::open(dir.path()).await.unwrap());
        Fixture {
            builder: DagBuilder::new(Arc::clone(&kv), Arc::clone(&blobs)),
            kv,
            blobs,
            _dir: dir,
        }
    }

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_full_roundtrip_multi_chunk() {
        let fx = fixture().await;
        let data = patterned(3 * CHUNK_SIZE + 12345);

        let root = fx.builder.create_dag(data.as_slice()).await.unwrap();
        let mut reader = DagReader::open(&root, Arc::clone(&fx.kv), Arc::clone(&fx.blobs))
            .await
            .unwrap();

        assert_eq!(reader.len(), data.len() as u64);
        let read_back = reader.read_to_end().await.unwrap();
        assert_eq!(read_back.len(), data.len());
        assert_eq!(read_back, data);
    }

    #[tokio::test]
    async fn test_full_roundtrip_single_chunk() {
        let fx = fixture().await;
        let data = patterned(12345);

        let root = fx.builder.create_dag(data.as_slice()).await.unwrap();
        let mut reader = DagReader::open(&root, Arc::clone(&fx.kv), Arc::clone(&fx.blobs))
            .await
            .unwrap();

        assert_eq!(reader.read_to_end().await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_seek_across_chunk_boundary() {
        let fx = fixture().await;

        let mut data = vec![b'A'; CHUNK_SIZE];
        data.extend(std::iter::repeat(b'B').take(CHUNK_SIZE));

        let root = fx.builder.create_dag(data.as_slice()).await.unwrap();
        let mut reader = DagReader::open(&root, Arc::clone(&fx.kv), Arc::clone(&fx.blobs))
            .await
            .unwrap();

        reader.seek(SeekFrom::Start(CHUNK_SIZE as u64 + 100)).unwrap();
        let mut buf = [0u8; 5];
        let n = reader.read(&mut buf).await.unwrap();

        assert_eq!(n, 5);
        assert_eq!(&buf, b"BBBBB");
    }

    #[tokio::test]
    async fn test_seek_read_matches_slice() {
        let fx = fixture().await;
        let data = patterned(2 * CHUNK_SIZE + 777);

        let root = fx.builder.create_dag(data.as_slice()).await.unwrap();
        let mut reader = DagReader::open(&root, Arc::clone(&fx.kv), Arc::clone(&fx.blobs))
            .await
            .unwrap();

        for offset in [0usize, 1, CHUNK_SIZE - 1, CHUNK_SIZE, 2 * CHUNK_SIZE + 700] {
            reader.seek(SeekFrom::Start(offset as u64)).unwrap();
            let mut buf = vec![0u8; 64];
            let n = reader.read(&mut buf).await.unwrap();
            let expected = &data[offset..(offset + 64).min(data.len())];
            assert_eq!(&buf[..n], expected, "mismatch at offset {offset}");
        }
    }

    #[tokio::test]
    async fn test_seek_whence_variants() {
        let fx = fixture().await;
        let data = patterned(1000);

        let root = fx.builder.create_dag(data.as_slice()).await.unwrap();
        let mut reader = DagReader::open(&root, Arc::clone(&fx.kv), Arc::clone(&fx.blobs))
            .await
            .unwrap();

        assert_eq!(reader.seek(SeekFrom::Start(100)).unwrap(), 100);
        assert_eq!(reader.seek(SeekFrom::Current(50)).unwrap(), 150);
        assert_eq!(reader.seek(SeekFrom::End(-100)).unwrap(), 900);

        assert!(matches!(
            reader.seek(SeekFrom::Current(-2000)),
            Err(DagError::NegativePosition)
        ));
        assert!(matches!(
            reader.seek(SeekFrom::End(1)),
            Err(DagError::OffsetOutOfRange)
        ));
    }

    #[tokio::test]
    async fn test_read_past_end_returns_zero() {
        let fx = fixture().await;
        let data = patterned(10);

        let root = fx.builder.create_dag(data.as_slice()).await.unwrap();
        let mut reader = DagReader::open(&root, Arc::clone(&fx.kv), Arc::clone(&fx.blobs))
            .await
            .unwrap();

        reader.seek(SeekFrom::End(0)).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
    }
}
