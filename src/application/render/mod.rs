//! The post rendering pipeline.
//!
//! `render` deterministically converts one raw message into a title, a flag
//! set and an HTML body with signed content URLs. Rendering proceeds as an
//! ordered decision pipeline (service override, forward/reply annotation,
//! body assembly, footer); title derivation and flag extraction run on the
//! side. Sub-block formatting failures degrade to an omitted block; the only
//! hard failure is an unavailable signing key, without which no content URL
//! could be built at all.

mod flags;
mod html;
mod title;

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::application::signing::{SigningError, SigningService};
use crate::domain::content::ContentKey;
use crate::domain::message::{Message, MessageContent};
use crate::domain::post::RenderedPost;

pub use title::is_generic_label;

/// Data-driven rendering and flag policy. Loaded from settings so policy
/// changes never touch pipeline code.
#[derive(Debug, Clone)]
pub struct RenderPolicy {
    /// The platform's own web domain; links to it are never `link`-flagged.
    pub platform_domain: String,
    /// Captions at or above this length suppress the `video` flag.
    pub video_caption_max: usize,
    /// Minimum text length before the text-derived title applies.
    pub title_text_floor: usize,
    /// Hard cap for derived titles.
    pub title_max_chars: usize,
    /// Bounding box (px) for visual media embeds.
    pub media_box: u32,
    /// Width cap (px) for audio embeds.
    pub audio_width: u32,
    /// Reaction emoji counting towards `clownpoo`.
    pub mockery_emoji: Vec<String>,
    /// Minimum count a single mockery reaction must reach.
    pub mockery_min_count: u32,
    pub keywords: KeywordSets,
}

/// Language-specific keyword sets for the text-derived flags.
#[derive(Debug, Clone)]
pub struct KeywordSets {
    pub stream: Vec<String>,
    pub donat: Vec<String>,
    pub advert: Vec<String>,
    pub paywall: Vec<String>,
}

impl Default for RenderPolicy {
    fn default() -> Self {
        Self {
            platform_domain: "t.me".to_string(),
            video_caption_max: 200,
            title_text_floor: 10,
            title_max_chars: 51,
            media_box: 600,
            audio_width: 400,
            mockery_emoji: vec!["🤡".to_string(), "💩".to_string()],
            mockery_min_count: 10,
            keywords: KeywordSets::default(),
        }
    }
}

impl Default for KeywordSets {
    fn default() -> Self {
        Self {
            stream: ["стрим", "эфир", "stream"].map(String::from).to_vec(),
            donat: ["донат", "donat", "donation"].map(String::from).to_vec(),
            advert: ["#реклама", "#ad", "advert", "erid"]
                .map(String::from)
                .to_vec(),
            paywall: ["boosty.to", "patreon.com", "sponsr.ru", "paywall"]
                .map(String::from)
                .to_vec(),
        }
    }
}

impl RenderPolicy {
    /// Build the policy from deployment settings; unset keyword sets fall
    /// back to the built-in defaults.
    pub fn from_settings(platform_domain: &str, render: &crate::config::RenderSettings) -> Self {
        let defaults = KeywordSets::default();
        Self {
            platform_domain: platform_domain.to_string(),
            video_caption_max: render.video_caption_max,
            title_text_floor: render.title_text_floor,
            title_max_chars: render.title_max_chars,
            media_box: render.media_box,
            audio_width: render.audio_width,
            mockery_emoji: render.mockery_emoji.clone(),
            mockery_min_count: render.mockery_min_count,
            keywords: KeywordSets {
                stream: render.keywords.stream.clone().unwrap_or(defaults.stream),
                donat: render.keywords.donat.clone().unwrap_or(defaults.donat),
                advert: render.keywords.advert.clone().unwrap_or(defaults.advert),
                paywall: render.keywords.paywall.clone().unwrap_or(defaults.paywall),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("content signing unavailable")]
    Signing(#[from] SigningError),
}

pub struct RenderService {
    signing: Arc<SigningService>,
    policy: RenderPolicy,
}

impl RenderService {
    pub fn new(signing: Arc<SigningService>, policy: RenderPolicy) -> Self {
        Self { signing, policy }
    }

    pub fn policy(&self) -> &RenderPolicy {
        &self.policy
    }

    /// Render one message. `naked` suppresses the outer wrapper and the
    /// footer; media-group members are rendered naked so the group can be
    /// wrapped once by the feed assembler.
    pub async fn render(
        &self,
        message: &Message,
        naked: bool,
    ) -> Result<RenderedPost, RenderError> {
        let title = title::derive_title(message, &self.policy);
        let flags = flags::extract_flags(message, &self.policy);
        let body = self.render_body(message, naked).await?;
        let html = if naked {
            body
        } else {
            html::wrap_document(&body)
        };

        Ok(RenderedPost {
            channel: message.channel.clone(),
            post_id: message.id,
            timestamp: message.date,
            plain_text: message.text.clone(),
            html,
            title,
            author: message.author.clone(),
            views: message.views,
            media_group_id: message.media_group_id.clone(),
            flags,
        })
    }

    async fn render_body(&self, message: &Message, naked: bool) -> Result<String, RenderError> {
        if let MessageContent::Service(event) = &message.content {
            return Ok(format!(
                "<div class=\"service\">{}</div>",
                html::escape_html(event.label())
            ));
        }

        let mut body = String::new();

        // At most one of the forward/reply annotations is emitted.
        if let Some(origin) = &message.forward {
            body.push_str(&html::forward_block(origin, &self.policy.platform_domain));
        } else if let Some(reply) = &message.reply_to {
            body.push_str(&html::reply_block(reply));
        }

        if !message.text.is_empty() {
            body.push_str(&html::text_block(&message.text));
        }

        if let MessageContent::Poll(poll) = &message.content {
            match html::poll_block(poll) {
                Ok(block) => body.push_str(&block),
                Err(err) => warn!(
                    target = "application::render",
                    channel = %message.channel,
                    post_id = message.id,
                    error = %err,
                    "poll block failed, omitted"
                ),
            }
        }

        if let Some(item) = message.content.media_item() {
            let url = self
                .signed_content_url(&message.channel, message.id, &item.unique_id)
                .await?;
            body.push_str(&html::media_embed(&message.content, &url, &self.policy));
        }

        if let Some(preview) = &message.link_preview {
            let thumb_url = match &preview.thumbnail {
                Some(thumb) => Some(
                    self.signed_content_url(&message.channel, message.id, &thumb.unique_id)
                        .await?,
                ),
                None => None,
            };
            match html::preview_embed(preview, thumb_url.as_deref()) {
                Ok(block) => body.push_str(&block),
                Err(err) => warn!(
                    target = "application::render",
                    channel = %message.channel,
                    post_id = message.id,
                    error = %err,
                    "link preview block failed, omitted"
                ),
            }
        }

        if !naked {
            match html::footer_block(message, &self.policy) {
                Ok(block) => body.push_str(&block),
                Err(err) => warn!(
                    target = "application::render",
                    channel = %message.channel,
                    post_id = message.id,
                    error = %err,
                    "footer block failed, omitted"
                ),
            }
        }

        Ok(body)
    }

    async fn signed_content_url(
        &self,
        channel: &str,
        post_id: i64,
        unique_id: &str,
    ) -> Result<String, RenderError> {
        let key = ContentKey::new(channel, post_id, unique_id);
        let path = key.reference_path();
        let digest = self.signing.sign(&path).await?;
        Ok(format!("/content/{path}?digest={digest}"))
    }

    /// Wrap already-rendered (naked) bodies into one document. Used by the
    /// feed assembler after merging a media group.
    pub fn wrap_merged(&self, inner: &str) -> String {
        html::wrap_document(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::{
        LinkPreview, MediaItem, Message, PollBlock, Reaction, ReplyRef, ServiceEvent,
    };
    use crate::domain::post::PostFlag;

    fn service() -> Arc<SigningService> {
        let dir = tempfile::tempdir().expect("tempdir");
        let key_file = dir.path().join("signing.key");
        // Leak the tempdir so the key file outlives the helper.
        std::mem::forget(dir);
        Arc::new(SigningService::new(key_file, true))
    }

    fn renderer() -> RenderService {
        RenderService::new(service(), RenderPolicy::default())
    }

    fn media(unique_id: &str) -> MediaItem {
        MediaItem {
            unique_id: unique_id.to_string(),
            reference: "ref".to_string(),
            width: Some(1200),
            height: Some(900),
            mime_type: None,
            file_name: None,
        }
    }

    fn base_message() -> Message {
        Message {
            channel: "chan".to_string(),
            id: 10,
            date: 1_700_000_000,
            author: Some("Author".to_string()),
            views: Some(42),
            media_group_id: None,
            text: "A plain text post with enough length".to_string(),
            forward: None,
            reply_to: None,
            link_preview: None,
            reactions: vec![Reaction {
                emoji: "👍".to_string(),
                count: 3,
            }],
            content: MessageContent::Text,
        }
    }

    #[tokio::test]
    async fn render_produces_wrapped_document_with_footer() {
        let post = renderer()
            .render(&base_message(), false)
            .await
            .expect("render");
        assert!(post.html.starts_with("<article class=\"post\">"));
        assert!(post.html.contains("class=\"footer\""));
        assert!(!post.title.is_empty());
    }

    #[tokio::test]
    async fn naked_render_suppresses_wrapper_and_footer() {
        let post = renderer()
            .render(&base_message(), true)
            .await
            .expect("render");
        assert!(!post.html.contains("<article"));
        assert!(!post.html.contains("class=\"footer\""));
    }

    #[tokio::test]
    async fn media_embed_carries_verifiable_digest() {
        let signing = service();
        let renderer = RenderService::new(signing.clone(), RenderPolicy::default());
        let mut message = base_message();
        message.content = MessageContent::Photo(media("uid1"));

        let post = renderer.render(&message, false).await.expect("render");
        let start = post.html.find("/content/").expect("content url");
        let url = &post.html[start..];
        let url = &url[..url.find('"').expect("quote")];
        let (path, digest) = url
            .trim_start_matches("/content/")
            .split_once("?digest=")
            .expect("digest param");
        assert!(signing.verify(path, Some(digest)).await.expect("verify"));
    }

    #[tokio::test]
    async fn photo_is_bounded_to_media_box() {
        let mut message = base_message();
        message.content = MessageContent::Photo(media("uid1"));
        let post = renderer().render(&message, false).await.expect("render");
        assert!(post.html.contains("width=\"600\" height=\"450\""));
    }

    #[tokio::test]
    async fn service_message_renders_single_line() {
        let mut message = base_message();
        message.content = MessageContent::Service(ServiceEvent::ChatTitleChanged);
        let post = renderer().render(&message, false).await.expect("render");
        assert_eq!(post.title, "✏️ Chat title updated");
        assert!(post.html.contains("class=\"service\""));
        assert!(!post.html.contains("class=\"footer\""));
        assert!(post.flags.is_empty());
    }

    #[tokio::test]
    async fn forward_wins_over_reply() {
        let mut message = base_message();
        message.forward = Some(crate::domain::message::ForwardOrigin {
            channel_handle: Some("origin".to_string()),
            display_name: None,
        });
        message.reply_to = Some(ReplyRef {
            post_id: 3,
            excerpt: Some("earlier".to_string()),
        });
        let post = renderer().render(&message, false).await.expect("render");
        assert!(post.html.contains("Forwarded from"));
        assert!(!post.html.contains("Reply to #3"));
        assert!(post.flags.contains(&PostFlag::Fwd));
    }

    #[tokio::test]
    async fn poll_renders_question_and_options() {
        let mut message = base_message();
        message.text = String::new();
        message.content = MessageContent::Poll(PollBlock {
            question: "Favourite season?".to_string(),
            options: vec!["Winter".to_string(), "Summer".to_string()],
        });
        let post = renderer().render(&message, false).await.expect("render");
        assert!(post.html.contains("Favourite season?"));
        assert!(post.html.contains("<li>Winter</li>"));
        assert_eq!(post.title, "📊 Poll");
    }

    #[tokio::test]
    async fn link_preview_thumbnail_is_clickable() {
        let mut message = base_message();
        message.text = String::new();
        message.link_preview = Some(LinkPreview {
            url: "https://example.com/story".to_string(),
            title: Some("Story".to_string()),
            description: Some("All the details".to_string()),
            thumbnail: Some(media("thumb1")),
        });
        let post = renderer().render(&message, false).await.expect("render");
        assert!(post.html.contains("class=\"linkpreview\""));
        assert!(post.html.contains("class=\"thumb\""));
        assert!(post.html.contains("https://example.com/story"));
        assert!(post.html.contains("All the details"));
    }
}
