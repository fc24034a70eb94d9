//! Journaled file-backed key-value store.
//!
//! The full map lives in memory; durability comes from a JSON-lines journal
//! replayed on open, periodically folded into a snapshot so the journal
//! stays bounded. Writes append one record and fsync before returning.

use crate::{Kv, StorageError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const SNAPSHOT_FILE: &str = "kv.snapshot";
const JOURNAL_FILE: &str = "kv.log";

/// Journal entries at which a maintenance pass folds the journal into the
/// snapshot.
const COMPACT_THRESHOLD: u64 = 4096;

#[derive(Serialize, Deserialize)]
struct JournalRecord {
    op: String,
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
}

struct FileKvState {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
    journal: File,
    journal_len: u64,
}

/// File-backed ordered key-value store.
pub struct FileKv {
    dir: PathBuf,
    state: Mutex<FileKvState>,
}

impl FileKv {
    /// Open (or create) a store rooted at `dir`.
    pub async fn open(dir: &Path) -> Result<Self, StorageError> {
        tokio::fs::create_dir_all(dir).await?;

        let mut map = BTreeMap::new();

        let snapshot_path = dir.join(SNAPSHOT_FILE);
        if let Ok(raw) = tokio::fs::read(&snapshot_path).await {
            let pairs: Vec<(String, String)> = serde_json::from_slice(&raw)?;
            for (k, v) in pairs {
                let key = hex::decode(&k)
                    .map_err(|_| StorageError::Corruption(format!("snapshot key {k}")))?;
                let value = hex::decode(&v)
                    .map_err(|_| StorageError::Corruption(format!("snapshot value for {k}")))?;
                map.insert(key, value);
            }
        }

        let journal_path = dir.join(JOURNAL_FILE);
        let mut journal_len = 0u64;
        if journal_path.exists() {
            let reader = BufReader::new(File::open(&journal_path).await?);
            let mut lines = reader.lines();
            while let Some(line) = lines.next_line().await? {
                if line.is_empty() {
                    continue;
                }
                let record: JournalRecord = match serde_json::from_str(&line) {
                    Ok(r) => r,
                    Err(err) => {
                        // A torn tail write is expected after a crash; stop
                        // replay at the first bad line.
                        warn!("journal replay stopped at malformed record: {err}");
                        break;
                    }
                };
                let key = hex::decode(&record.key)
                    .map_err(|_| StorageError::Corruption("journal key".into()))?;
                match record.op.as_str() {
                    "set" => {
                        let value = record
                            .value
                            .as_deref()
                            .and_then(|v| hex::decode(v).ok())
                            .ok_or_else(|| StorageError::Corruption("journal value".into()))?;
                        map.insert(key, value);
                    }
                    "del" => {
                        map.remove(&key);
                    }
                    other => {
                        return Err(StorageError::Corruption(format!("journal op {other}")));
                    }
                }
                journal_len += 1;
            }
        }

        let journal = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&journal_path)
            .await?;

        Ok(Self {
            dir: dir.to_path_buf(),
            state: Mutex::new(FileKvState {
                map,
                journal,
                journal_len,
            }),
        })
    }

    async fn append(state: &mut FileKvState, record: &JournalRecord) -> Result<(), StorageError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        state.journal.write_all(&line).await?;
        state.journal.sync_data().await?;
        state.journal_len += 1;
        Ok(())
    }

    /// Fold the journal into a fresh snapshot and truncate it.
    pub async fn compact(&self) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        if state.journal_len == 0 {
            return Ok(());
        }

        let pairs: Vec<(String, String)> = state
            .map
            .iter()
            .map(|(k, v)| (hex::encode(k), hex::encode(v)))
            .collect();
        let raw = serde_json::to_vec(&pairs)?;

        let tmp_path = self.dir.join(format!("{SNAPSHOT_FILE}.tmp"));
        let mut tmp = File::create(&tmp_path).await?;
        tmp.write_all(&raw).await?;
        tmp.sync_all().await?;
        drop(tmp);
        tokio::fs::rename(&tmp_path, self.dir.join(SNAPSHOT_FILE)).await?;

        state.journal.set_len(0).await?;
        state.journal.seek(std::io::SeekFrom::Start(0)).await?;
        debug!("compacted {} journal entries", state.journal_len);
        state.journal_len = 0;

        Ok(())
    }

    /// Spawn a background maintenance loop that compacts the journal once
    /// it grows past the threshold.
    pub fn spawn_maintenance(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let kv = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let due = kv.state.lock().await.journal_len >= COMPACT_THRESHOLD;
                if due {
                    if let Err(err) = kv.compact().await {
                        warn!("kv compaction failed: {err}");
                    }
                }
            }
        })
    }
}

#[async_trait]
impl Kv for FileKv {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.state.lock().await.map.get(key).cloned())
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        let record = JournalRecord {
            op: "set".into(),
            key: hex::encode(key),
            value: Some(hex::encode(value)),
        };
        Self::append(&mut state, &record).await?;
        state.map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        let record = JournalRecord {
            op: "del".into(),
            key: hex::encode(key),
            value: None,
        };
        Self::append(&mut state, &record).await?;
        state.map.remove(key);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let state = self.state.lock().await;
        let pairs = state
            .map
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(pairs)
    }
}
