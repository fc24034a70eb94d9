//! Pooled chunk buffers.
//!
//! Chunking allocates one 256 KiB buffer per in-flight build; the free list
//! keeps a handful warm. The guard returns its buffer on drop, so every
//! exit path (including error returns from the blob store) releases it.

use crate::builder::CHUNK_SIZE;
use once_cell::sync::Lazy;
use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

const POOL_CAPACITY: usize = 8;

static CHUNK_POOL: Lazy<Mutex<Vec<Vec<u8>>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// A chunk buffer checked out of the pool.
pub struct PooledChunk {
    buf: Option<Vec<u8>>,
}

impl Deref for PooledChunk {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledChunk {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledChunk {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            let mut pool = match CHUNK_POOL.lock() {
                Ok(pool) => pool,
                Err(poisoned) => poisoned.into_inner(),
            };
            if pool.len() < POOL_CAPACITY {
                pool.push(buf);
            }
        }
    }
}

/// Check a zeroed-capacity chunk buffer out of the pool.
pub fn get_chunk_buffer() -> PooledChunk {
    let reused = {
        let mut pool = match CHUNK_POOL.lock() {
            Ok(pool) => pool,
            Err(poisoned) => poisoned.into_inner(),
        };
        pool.pop()
    };

    PooledChunk {
        buf: Some(reused.unwrap_or_else(|| vec![0u8; CHUNK_SIZE])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_has_chunk_size() {
        let buf = get_chunk_buffer();
        assert_eq!(buf.len(), CHUNK_SIZE);
    }

    #[test]
    fn test_buffer_returns_to_pool() {
        {
            let mut buf = get_chunk_buffer();
            buf[0] = 0x55;
        }
        // The marked buffer is reused (pool is process-global, so another
        // buffer may come back first; just assert shape).
        let buf = get_chunk_buffer();
        assert_eq!(buf.len(), CHUNK_SIZE);
    }
}
