//! Content cache manager.
//!
//! Turns the remote, rate-limited, pay-per-fetch binary store into a locally
//! durable cache. `resolve` is disk-first and idempotent: a hit touches the
//! index entry; a miss locates the live reference through the platform
//! client, streams it to a temp file and installs it atomically. `serve`
//! sniffs the content type from file bytes before falling back to the
//! extension.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::fs;
use tracing::debug;

use crate::domain::content::ContentKey;
use crate::infra::platform::{PlatformClient, PlatformError};

use super::index::{CacheIndex, IndexError};

const SOURCE: &str = "infra::cache::store";

const INDEX_FILE: &str = "cache-index.json";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("content not found")]
    NotFound,
    #[error("upstream fetch failed")]
    Upstream(#[source] PlatformError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Index(#[from] IndexError),
}

pub struct ContentCache {
    root: PathBuf,
    index: CacheIndex,
    platform: Arc<dyn PlatformClient>,
}

impl ContentCache {
    /// Initialise the cache rooted at `root`, creating the directory if
    /// necessary. The index file lives inside the root.
    pub fn new(root: PathBuf, platform: Arc<dyn PlatformClient>) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        let index = CacheIndex::new(root.join(INDEX_FILE));
        Ok(Self {
            root,
            index,
            platform,
        })
    }

    pub fn index(&self) -> &CacheIndex {
        &self.index
    }

    /// Canonical on-disk path for a content key.
    pub fn content_path(&self, key: &ContentKey) -> PathBuf {
        self.root.join(key.file_stem())
    }

    /// Return the local path for `key`, downloading on a miss.
    ///
    /// A hit refreshes the index entry's last-access time. A miss re-fetches
    /// the message to locate the live content reference, so a post whose
    /// attachment disappeared upstream yields `NotFound`.
    pub async fn resolve(&self, key: &ContentKey) -> Result<PathBuf, CacheError> {
        let path = self.content_path(key);
        if fs::try_exists(&path).await? {
            counter!("rivista_content_cache_hit_total").increment(1);
            self.index.touch(key, epoch_now()).await?;
            return Ok(path);
        }
        counter!("rivista_content_cache_miss_total").increment(1);

        let message = self
            .platform
            .get_message(&key.channel, key.post_id)
            .await
            .map_err(|err| match err {
                PlatformError::NotFound => CacheError::NotFound,
                other => CacheError::Upstream(other),
            })?;
        let item = message
            .find_content(&key.unique_id)
            .ok_or(CacheError::NotFound)?;

        let tmp = tempfile::Builder::new()
            .prefix(".fetch-")
            .tempfile_in(&self.root)?
            .into_temp_path();
        let written = self
            .platform
            .download_content(&item.reference, &tmp)
            .await
            .map_err(|err| match err {
                PlatformError::NotFound => CacheError::NotFound,
                other => CacheError::Upstream(other),
            })?;
        tmp.persist(&path).map_err(|err| CacheError::Io(err.error))?;

        self.index.touch(key, epoch_now()).await?;
        counter!("rivista_content_download_total").increment(1);
        debug!(
            target = SOURCE,
            key = %key,
            bytes = written,
            "content downloaded and installed"
        );
        Ok(path)
    }

    /// Read cached bytes and a content type: sniffed from leading bytes,
    /// then guessed from the extension, then the generic binary type.
    pub async fn serve(&self, path: &Path) -> Result<(Bytes, &'static str), CacheError> {
        let data = match fs::read(path).await {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(CacheError::NotFound),
            Err(err) => return Err(err.into()),
        };
        let content_type = sniff_content_type(&data, path);
        Ok((Bytes::from(data), content_type))
    }

    /// Remove the backing file for `key`. Missing files are treated as
    /// success so eviction can drop the entry either way.
    pub(super) async fn remove_file(&self, key: &ContentKey) -> Result<(), std::io::Error> {
        match fs::remove_file(self.content_path(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

pub(super) fn epoch_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn sniff_content_type(data: &[u8], path: &Path) -> &'static str {
    if let Some(sniffed) = sniff_magic(data) {
        return sniffed;
    }
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
}

/// Magic-byte table for the media types the platform actually serves.
fn sniff_magic(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    if data.len() >= 12 && &data[4..8] == b"ftyp" {
        return Some("video/mp4");
    }
    if data.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some("video/webm");
    }
    if data.starts_with(b"OggS") {
        return Some("audio/ogg");
    }
    if data.starts_with(b"fLaC") {
        return Some("audio/flac");
    }
    if data.starts_with(b"ID3")
        || data.starts_with(&[0xFF, 0xFB])
        || data.starts_with(&[0xFF, 0xF3])
        || data.starts_with(&[0xFF, 0xF2])
    {
        return Some("audio/mpeg");
    }
    if data.starts_with(b"%PDF") {
        return Some("application/pdf");
    }
    None
}
