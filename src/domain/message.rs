//! Messages as decoded at the platform boundary.
//!
//! The gateway client decodes its JSON payload into this exhaustively-cased
//! model exactly once; everything downstream matches on [`MessageContent`]
//! instead of probing optional fields.

use serde::{Deserialize, Serialize};

/// One channel post, decoded from the platform collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub channel: String,
    pub id: i64,
    /// Publication time, epoch seconds.
    pub date: i64,
    pub author: Option<String>,
    pub views: Option<u64>,
    pub media_group_id: Option<String>,
    /// Message text or media caption, plain and unescaped.
    pub text: String,
    pub forward: Option<ForwardOrigin>,
    pub reply_to: Option<ReplyRef>,
    pub link_preview: Option<LinkPreview>,
    pub reactions: Vec<Reaction>,
    pub content: MessageContent,
}

impl Message {
    /// Locate the attached media item carrying `unique_id`, covering both
    /// the primary attachment and a link preview's own thumbnail.
    pub fn find_content(&self, unique_id: &str) -> Option<&MediaItem> {
        if let Some(item) = self.content.media_item()
            && item.unique_id == unique_id
        {
            return Some(item);
        }
        self.link_preview
            .as_ref()
            .and_then(|preview| preview.thumbnail.as_ref())
            .filter(|thumb| thumb.unique_id == unique_id)
    }
}

/// Exhaustive content cases. Unknown platform kinds land in `Unsupported`
/// rather than failing the decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    Text,
    Photo(MediaItem),
    Video(MediaItem),
    Animation(MediaItem),
    Audio(MediaItem),
    Voice(MediaItem),
    VideoNote(MediaItem),
    Sticker(MediaItem),
    Document(MediaItem),
    Poll(PollBlock),
    Service(ServiceEvent),
    #[serde(other)]
    Unsupported,
}

impl MessageContent {
    /// Media that renders inside the visual bounding box.
    pub fn is_visual(&self) -> bool {
        matches!(
            self,
            MessageContent::Photo(_)
                | MessageContent::Video(_)
                | MessageContent::Animation(_)
                | MessageContent::Sticker(_)
                | MessageContent::VideoNote(_)
        )
    }

    pub fn media_item(&self) -> Option<&MediaItem> {
        match self {
            MessageContent::Photo(item)
            | MessageContent::Video(item)
            | MessageContent::Animation(item)
            | MessageContent::Audio(item)
            | MessageContent::Voice(item)
            | MessageContent::VideoNote(item)
            | MessageContent::Sticker(item)
            | MessageContent::Document(item) => Some(item),
            MessageContent::Text
            | MessageContent::Poll(_)
            | MessageContent::Service(_)
            | MessageContent::Unsupported => None,
        }
    }
}

/// One attached binary.
///
/// `reference` is the platform's transient download locator; `unique_id`
/// stays stable across re-fetches of the same physical file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub unique_id: String,
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollBlock {
    pub question: String,
    pub options: Vec<String>,
}

/// Service events carry no body of their own; the renderer titles them from
/// a fixed table and emits a single descriptive line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceEvent {
    ChannelCreated,
    GroupCreated,
    MessagePinned,
    ChatPhotoChanged,
    ChatTitleChanged,
    VideoChatScheduled,
    VideoChatStarted,
    VideoChatEnded,
}

impl ServiceEvent {
    pub fn label(self) -> &'static str {
        match self {
            ServiceEvent::ChannelCreated => "📢 Channel created",
            ServiceEvent::GroupCreated => "👥 Group created",
            ServiceEvent::MessagePinned => "📌 Message pinned",
            ServiceEvent::ChatPhotoChanged => "🖼 Chat photo updated",
            ServiceEvent::ChatTitleChanged => "✏️ Chat title updated",
            ServiceEvent::VideoChatScheduled => "🎦 Video chat scheduled",
            ServiceEvent::VideoChatStarted => "🎦 Video chat started",
            ServiceEvent::VideoChatEnded => "🎦 Video chat ended",
        }
    }
}

/// Origin of a forwarded post. Both fields absent means the sender hides
/// their identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardOrigin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyRef {
    pub post_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkPreview {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<MediaItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    pub count: u32,
}

/// Channel-level metadata used for feed headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMetadata {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(unique_id: &str) -> MediaItem {
        MediaItem {
            unique_id: unique_id.to_string(),
            reference: format!("ref-{unique_id}"),
            width: None,
            height: None,
            mime_type: None,
            file_name: None,
        }
    }

    fn message_with(content: MessageContent) -> Message {
        Message {
            channel: "chan".to_string(),
            id: 1,
            date: 0,
            author: None,
            views: None,
            media_group_id: None,
            text: String::new(),
            forward: None,
            reply_to: None,
            link_preview: None,
            reactions: Vec::new(),
            content,
        }
    }

    #[test]
    fn find_content_matches_primary_attachment() {
        let message = message_with(MessageContent::Photo(media("abc")));
        assert!(message.find_content("abc").is_some());
        assert!(message.find_content("xyz").is_none());
    }

    #[test]
    fn find_content_matches_preview_thumbnail() {
        let mut message = message_with(MessageContent::Text);
        message.link_preview = Some(LinkPreview {
            url: "https://example.com".to_string(),
            title: None,
            description: None,
            thumbnail: Some(media("thumb")),
        });
        assert!(message.find_content("thumb").is_some());
    }

    #[test]
    fn unknown_content_kind_decodes_as_unsupported() {
        let raw = r#"{"kind":"hologram"}"#;
        let content: MessageContent = serde_json::from_str(raw).expect("decode");
        assert_eq!(content, MessageContent::Unsupported);
    }

    #[test]
    fn polls_are_not_visual() {
        let poll = MessageContent::Poll(PollBlock {
            question: "q".to_string(),
            options: vec!["a".to_string()],
        });
        assert!(!poll.is_visual());
        assert!(MessageContent::Photo(media("p")).is_visual());
    }
}
