//! DAG node wire format and in-memory link representation.

use crate::error::DagError;

/// KV prefix under which interior nodes are persisted; the raw 32-byte
/// hash of the serialized node follows the prefix.
pub const DAG_NODE_PREFIX: &[u8] = b"dag_node:";

/// Build the KV key for an interior node from its hex hash.
pub fn node_key(hash_hex: &str) -> Result<Vec<u8>, DagError> {
    let raw = hex::decode(hash_hex).map_err(|_| DagError::InvalidHash(hash_hex.to_string()))?;
    let mut key = Vec::with_capacity(DAG_NODE_PREFIX.len() + raw.len());
    key.extend_from_slice(DAG_NODE_PREFIX);
    key.extend_from_slice(&raw);
    Ok(key)
}

/// Semantic type of a DAG node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ::prost::Enumeration)]
#[repr(i32)]
pub enum NodeType {
    /// Chunked file content
    File = 0,
    /// Directory listing
    Directory = 1,
    /// Auxiliary metadata
    Metadata = 2,
    /// Symbolic link
    Symlink = 3,
    /// Commit object
    Commit = 4,
    /// Uninterpreted raw bytes
    Raw = 5,
}

/// Serialized interior node. Content-addressed by the SHA-256 of these
/// encoded bytes.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DagNode {
    /// Node type discriminator
    #[prost(enumeration = "NodeType", tag = "1")]
    pub node_type: i32,
    /// Inline data (unused for chunked files)
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
    /// Child links, in stream order
    #[prost(message, repeated, tag = "3")]
    pub links: Vec<DagLink>,
    /// Total logical size of the subtree
    #[prost(uint64, tag = "4")]
    pub filesize: u64,
    /// Per-child sizes, mirroring `links` order
    #[prost(uint64, repeated, tag = "5")]
    pub blocksizes: Vec<u64>,
}

/// Serialized child link.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DagLink {
    /// Raw 32-byte SHA-256 of the child
    #[prost(bytes = "vec", tag = "1")]
    pub hash: Vec<u8>,
    /// Optional child name (empty for file chunks)
    #[prost(string, tag = "2")]
    pub name: ::prost::alloc::string::String,
    /// Logical size of the child subtree
    #[prost(uint64, tag = "3")]
    pub tsize: u64,
}

/// In-memory link with a hex hash, the form the builder and reader work in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    /// Hex SHA-256 of the child
    pub hash: String,
    /// Optional child name
    pub name: String,
    /// Logical size of the child subtree
    pub tsize: u64,
}

impl Link {
    /// Leaf link for a raw chunk.
    pub fn chunk(hash: String, tsize: u64) -> Self {
        Self {
            hash,
            name: String::new(),
            tsize,
        }
    }

    /// Convert to the wire form.
    pub fn to_proto(&self) -> Result<DagLink, DagError> {
        let hash =
            hex::decode(&self.hash).map_err(|_| DagError::InvalidHash(self.hash.clone()))?;
        Ok(DagLink {
            hash,
            name: self.name.clone(),
            tsize: self.tsize,
        })
    }

    /// Convert from the wire form.
    pub fn from_proto(link: &DagLink) -> Self {
        Self {
            hash: hex::encode(&link.hash),
            name: link.name.clone(),
            tsize: link.tsize,
        }
    }
}

impl DagNode {
    /// Links in their in-memory hex form.
    pub fn hex_links(&self) -> Vec<Link> {
        self.links.iter().map(Link::from_proto).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_node_roundtrip() {
        let node = DagNode {
            node_type: NodeType::File as i32,
            data: Vec::new(),
            links: vec![DagLink {
                hash: vec![0xAB; 32],
                name: String::new(),
                tsize: 1024,
            }],
            filesize: 1024,
            blocksizes: vec![1024],
        };

        let decoded = DagNode::decode(node.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, node);
        assert_eq!(decoded.hex_links()[0].hash, hex::encode([0xAB; 32]));
    }

    #[test]
    fn test_node_key_layout() {
        let hash = hex::encode([0x11u8; 32]);
        let key = node_key(&hash).unwrap();
        assert!(key.starts_with(DAG_NODE_PREFIX));
        assert_eq!(key.len(), DAG_NODE_PREFIX.len() + 32);
    }

    #[test]
    fn test_node_key_rejects_bad_hex() {
        assert!(node_key("not-hex!").is_err());
    }
}
