//! Content-addressed filesystem blob store.
//!
//! Blocks live under `<base>/media/blocks/<h[0:2]>/<h[2:4]>/<h>` where `h`
//! is the hex SHA-256 of the content. Writes go through a temp file in the
//! cache directory and are published with an atomic rename, so a reader
//! never observes a partial blob.

use crate::StorageError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

const MEDIA_SUBDIRS: [&str; 4] = ["avatars", "files", "cache", "blocks"];

/// Sharded content-addressed blob store.
pub struct BlobStore {
    base: PathBuf,
}

impl BlobStore {
    /// Open a blob store under `app_data`, creating the media directory
    /// tree on first use.
    pub async fn open(app_data: &Path) -> Result<Self, StorageError> {
        let base = app_data.join("media");
        for sub in MEDIA_SUBDIRS {
            tokio::fs::create_dir_all(base.join(sub)).await?;
        }
        Ok(Self { base })
    }

    fn block_path(&self, hash_hex: &str) -> Result<PathBuf, StorageError> {
        if hash_hex.len() < 4 {
            return Err(StorageError::Invalid(format!(
                "hash too short: {hash_hex}"
            )));
        }
        Ok(self
            .base
            .join("blocks")
            .join(&hash_hex[0..2])
            .join(&hash_hex[2..4])
            .join(hash_hex))
    }

    /// Store a block under its hex hash. Idempotent: an existing blob with
    /// the same hash is left untouched.
    pub async fn store_block(&self, hash_hex: &str, data: &[u8]) -> Result<(), StorageError> {
        let final_path = self.block_path(hash_hex)?;
        if tokio::fs::try_exists(&final_path).await? {
            return Ok(());
        }

        if let Some(dir) = final_path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let tmp_path = self.base.join("cache").join(format!("blk_{hash_hex}"));
        let mut tmp = File::create(&tmp_path).await?;
        tmp.write_all(data).await?;
        tmp.sync_all().await?;
        drop(tmp);

        tokio::fs::rename(&tmp_path, &final_path).await?;
        Ok(())
    }

    /// Open a stored block for seekable reading.
    pub async fn open_block(&self, hash_hex: &str) -> Result<File, StorageError> {
        let path = self.block_path(hash_hex)?;
        match OpenOptions::new().read(true).open(&path).await {
            Ok(file) => Ok(file),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
            Err(err) => Err(err.into()),
        }
    }

    /// Whether a block with the given hash is present.
    pub async fn has_block(&self, hash_hex: &str) -> Result<bool, StorageError> {
        Ok(tokio::fs::try_exists(self.block_path(hash_hex)?).await?)
    }

    /// Stream a file into a category directory (`files`, `avatars`), naming
    /// it by the hex SHA-256 of its content. Returns the hash.
    pub async fn store_file<R>(&self, mut reader: R, category: &str) -> Result<String, StorageError>
    where
        R: AsyncRead + Unpin,
    {
        static UPLOAD_SEQ: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let seq = UPLOAD_SEQ.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let tmp_path = self
            .base
            .join("cache")
            .join(format!("upload_{}_{seq}", std::process::id()));
        let mut tmp = File::create(&tmp_path).await?;

        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            tmp.write_all(&buf[..n]).await?;
        }
        tmp.sync_all().await?;
        drop(tmp);

        let hash_hex = hex::encode(hasher.finalize());
        let final_path = self.base.join(category).join(&hash_hex);

        if tokio::fs::try_exists(&final_path).await? {
            tokio::fs::remove_file(&tmp_path).await.ok();
            return Ok(hash_hex);
        }

        tokio::fs::rename(&tmp_path, &final_path).await?;
        Ok(hash_hex)
    }

    /// Open a stored file from a category directory.
    pub async fn open_file(&self, name: &str, category: &str) -> Result<File, StorageError> {
        let path = self.base.join(category).join(name);
        match OpenOptions::new().read(true).open(&path).await {
            Ok(file) => Ok(file),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
            Err(err) => Err(err.into()),
        }
    }
}
