//! JSON gateway implementation of the platform boundary.
//!
//! Talks to a colocated bot-gateway service over plain JSON endpoints. The
//! wire payload is decoded here, once, into the exhaustively-cased domain
//! model; nothing downstream ever probes optional SDK fields.

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::domain::message::{
    ChatMetadata, ForwardOrigin, LinkPreview, MediaItem, Message, MessageContent, PollBlock,
    Reaction, ReplyRef, ServiceEvent,
};

use super::{PlatformClient, PlatformError};

pub struct GatewayClient {
    base: Url,
    token: Option<String>,
    http: reqwest::Client,
}

impl GatewayClient {
    pub fn new(base: Url, token: Option<String>) -> Self {
        Self {
            base,
            token,
            http: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, PlatformError> {
        self.base
            .join(path)
            .map_err(|err| PlatformError::upstream(format!("invalid endpoint `{path}`: {err}")))
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response, PlatformError> {
        let mut request = self.http.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|err| PlatformError::upstream(err.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(PlatformError::NotFound),
            status if !status.is_success() => Err(PlatformError::upstream(format!(
                "gateway returned {status}"
            ))),
            _ => Ok(response),
        }
    }
}

#[async_trait]
impl PlatformClient for GatewayClient {
    async fn get_message(&self, channel: &str, id: i64) -> Result<Message, PlatformError> {
        let url = self.endpoint(&format!("channels/{channel}/messages/{id}"))?;
        let dto: MessageDto = self
            .get(url)
            .await?
            .json()
            .await
            .map_err(|err| PlatformError::Decode(err.to_string()))?;
        Ok(dto.into_domain(channel))
    }

    async fn get_chat_history(
        &self,
        channel: &str,
        limit: usize,
    ) -> Result<Vec<Message>, PlatformError> {
        let mut url = self.endpoint(&format!("channels/{channel}/history"))?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        let dtos: Vec<MessageDto> = self
            .get(url)
            .await?
            .json()
            .await
            .map_err(|err| PlatformError::Decode(err.to_string()))?;
        Ok(dtos
            .into_iter()
            .map(|dto| dto.into_domain(channel))
            .collect())
    }

    async fn get_chat_metadata(&self, channel: &str) -> Result<ChatMetadata, PlatformError> {
        let url = self.endpoint(&format!("channels/{channel}"))?;
        self.get(url)
            .await?
            .json()
            .await
            .map_err(|err| PlatformError::Decode(err.to_string()))
    }

    async fn download_content(
        &self,
        reference: &str,
        dest: &Path,
    ) -> Result<u64, PlatformError> {
        let url = self.endpoint(&format!("content/{reference}"))?;
        let response = self.get(url).await?;

        let mut file = fs::File::create(dest).await?;
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| PlatformError::upstream(err.to_string()))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

// Wire DTOs. The gateway omits the hosting channel from each message, so the
// caller injects it while converting.

#[derive(Debug, Deserialize)]
struct MessageDto {
    id: i64,
    date: i64,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    views: Option<u64>,
    #[serde(default)]
    media_group_id: Option<String>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    forward: Option<ForwardDto>,
    #[serde(default)]
    reply_to: Option<ReplyDto>,
    #[serde(default)]
    link_preview: Option<LinkPreviewDto>,
    #[serde(default)]
    reactions: Vec<ReactionDto>,
    content: ContentDto,
}

impl MessageDto {
    fn into_domain(self, channel: &str) -> Message {
        Message {
            channel: channel.to_string(),
            id: self.id,
            date: self.date,
            author: self.author,
            views: self.views,
            media_group_id: self.media_group_id,
            text: self.text,
            forward: self.forward.map(|f| ForwardOrigin {
                channel_handle: f.channel_handle,
                display_name: f.display_name,
            }),
            reply_to: self.reply_to.map(|r| ReplyRef {
                post_id: r.post_id,
                excerpt: r.excerpt,
            }),
            link_preview: self.link_preview.map(|p| LinkPreview {
                url: p.url,
                title: p.title,
                description: p.description,
                thumbnail: p.thumbnail.map(MediaDto::into_domain),
            }),
            reactions: self
                .reactions
                .into_iter()
                .map(|r| Reaction {
                    emoji: r.emoji,
                    count: r.count,
                })
                .collect(),
            content: self.content.into_domain(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ContentDto {
    Text,
    Photo(MediaDto),
    Video(MediaDto),
    Animation(MediaDto),
    Audio(MediaDto),
    Voice(MediaDto),
    VideoNote(MediaDto),
    Sticker(MediaDto),
    Document(MediaDto),
    Poll(PollDto),
    Service(ServiceDto),
    #[serde(other)]
    Unsupported,
}

impl ContentDto {
    fn into_domain(self) -> MessageContent {
        match self {
            ContentDto::Text => MessageContent::Text,
            ContentDto::Photo(m) => MessageContent::Photo(m.into_domain()),
            ContentDto::Video(m) => MessageContent::Video(m.into_domain()),
            ContentDto::Animation(m) => MessageContent::Animation(m.into_domain()),
            ContentDto::Audio(m) => MessageContent::Audio(m.into_domain()),
            ContentDto::Voice(m) => MessageContent::Voice(m.into_domain()),
            ContentDto::VideoNote(m) => MessageContent::VideoNote(m.into_domain()),
            ContentDto::Sticker(m) => MessageContent::Sticker(m.into_domain()),
            ContentDto::Document(m) => MessageContent::Document(m.into_domain()),
            ContentDto::Poll(p) => MessageContent::Poll(PollBlock {
                question: p.question,
                options: p.options,
            }),
            ContentDto::Service(s) => match s.event {
                Some(event) => MessageContent::Service(event),
                // Service kinds this build does not know stay renderable.
                None => MessageContent::Unsupported,
            },
            ContentDto::Unsupported => MessageContent::Unsupported,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MediaDto {
    unique_id: String,
    reference: String,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    file_name: Option<String>,
}

impl MediaDto {
    fn into_domain(self) -> MediaItem {
        MediaItem {
            unique_id: self.unique_id,
            reference: self.reference,
            width: self.width,
            height: self.height,
            mime_type: self.mime_type,
            file_name: self.file_name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PollDto {
    question: String,
    #[serde(default)]
    options: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ServiceDto {
    #[serde(default, deserialize_with = "lenient_service_event")]
    event: Option<ServiceEvent>,
}

/// Unknown service-event names decode to `None` instead of failing the
/// whole message.
fn lenient_service_event<'de, D>(deserializer: D) -> Result<Option<ServiceEvent>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|name| serde_json::from_value(serde_json::Value::String(name)).ok()))
}

#[derive(Debug, Deserialize)]
struct ForwardDto {
    #[serde(default)]
    channel_handle: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReplyDto {
    post_id: i64,
    #[serde(default)]
    excerpt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LinkPreviewDto {
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    thumbnail: Option<MediaDto>,
}

#[derive(Debug, Deserialize)]
struct ReactionDto {
    emoji: String,
    count: u32,
}
