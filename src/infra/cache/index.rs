//! Durable cache index.
//!
//! One record per cached content item: composite key plus last-access epoch
//! seconds. The index is a whole-file JSON structure replaced atomically on
//! every mutating change, so every read-modify-write is serialized behind a
//! single async mutex scoped to the index file. No other component mutates
//! the entry set.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::content::ContentKey;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntryRecord {
    pub key: ContentKey,
    /// Epoch seconds of the last hit or render-pass rediscovery.
    pub last_access: i64,
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("index file is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub struct CacheIndex {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CacheIndex {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current entry set. A missing index file reads as empty.
    pub async fn snapshot(&self) -> Result<Vec<CacheEntryRecord>, IndexError> {
        let _guard = self.lock.lock().await;
        load(&self.path).await
    }

    /// Set `last_access` for `key`, creating the entry when absent.
    pub async fn touch(&self, key: &ContentKey, now: i64) -> Result<(), IndexError> {
        let _guard = self.lock.lock().await;
        let mut entries = load(&self.path).await?;
        match entries.iter_mut().find(|entry| &entry.key == key) {
            Some(entry) => entry.last_access = now,
            None => entries.push(CacheEntryRecord {
                key: key.clone(),
                last_access: now,
            }),
        }
        persist(&self.path, &entries).await
    }

    /// Drop the named entries, skipping any that were touched again since
    /// the caller sampled them (a concurrent resolve may have just
    /// re-downloaded the file). Unknown keys are ignored.
    pub async fn prune(&self, keys: &[ContentKey], older_than: i64) -> Result<(), IndexError> {
        let _guard = self.lock.lock().await;
        let mut entries = load(&self.path).await?;
        entries.retain(|entry| entry.last_access >= older_than || !keys.contains(&entry.key));
        persist(&self.path, &entries).await
    }
}

async fn load(path: &Path) -> Result<Vec<CacheEntryRecord>, IndexError> {
    match fs::read(path).await {
        Ok(raw) => Ok(serde_json::from_slice(&raw)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err.into()),
    }
}

/// Atomic replace: write a sibling temp file, then rename over the index.
/// Readers never observe a partial write.
async fn persist(path: &Path, entries: &[CacheEntryRecord]) -> Result<(), IndexError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4().simple()));
    let encoded = serde_json::to_vec_pretty(entries)?;
    fs::write(&tmp, &encoded).await?;
    match fs::rename(&tmp, path).await {
        Ok(()) => Ok(()),
        Err(err) => {
            let _ = fs::remove_file(&tmp).await;
            Err(err.into())
        }
    }
}
