//! Messaging-platform collaborator boundary.
//!
//! The rest of the system only sees [`PlatformClient`]; the JSON gateway in
//! [`gateway`] is the one production implementation. Tests substitute
//! in-memory clients.

pub mod gateway;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::message::{ChatMetadata, Message};

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("message not found")]
    NotFound,
    #[error("upstream request failed: {message}")]
    Upstream { message: String },
    #[error("upstream payload could not be decoded: {0}")]
    Decode(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PlatformError {
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Fetch one message by id. `NotFound` when the post no longer exists.
    async fn get_message(&self, channel: &str, id: i64) -> Result<Message, PlatformError>;

    /// Most recent messages of a channel, newest first.
    async fn get_chat_history(
        &self,
        channel: &str,
        limit: usize,
    ) -> Result<Vec<Message>, PlatformError>;

    async fn get_chat_metadata(&self, channel: &str) -> Result<ChatMetadata, PlatformError>;

    /// Download the binary behind a transient content reference into `dest`,
    /// returning the number of bytes written. `dest` is a caller-owned
    /// temporary path; the cache manager performs the atomic install.
    async fn download_content(&self, reference: &str, dest: &Path)
    -> Result<u64, PlatformError>;
}
