//! Feed assembly.
//!
//! Pulls a channel's recent messages through the rendering pipeline, merges
//! media groups under one representative title, sorts by timestamp and emits
//! an RSS 2.0 document. Upstream unavailability fails the whole feed; a
//! single post's render failure is skipped and logged.

use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc2822;
use tracing::warn;

use crate::application::render::{RenderService, is_generic_label};
use crate::domain::message::ChatMetadata;
use crate::domain::post::RenderedPost;
use crate::infra::platform::{PlatformClient, PlatformError};

const SOURCE: &str = "application::feed";

/// Hard ceiling on feed size, independent of what the caller asks for.
pub const FEED_ITEM_CAP: usize = 100;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("channel not found")]
    NotFound,
    #[error("upstream history fetch failed")]
    Upstream(#[source] PlatformError),
}

pub struct FeedAssembler {
    platform: Arc<dyn PlatformClient>,
    renderer: Arc<RenderService>,
}

impl FeedAssembler {
    pub fn new(platform: Arc<dyn PlatformClient>, renderer: Arc<RenderService>) -> Self {
        Self { platform, renderer }
    }

    /// Build the RSS document for a channel's most recent posts.
    pub async fn assemble(&self, channel: &str, max_items: usize) -> Result<String, FeedError> {
        let limit = max_items.clamp(1, FEED_ITEM_CAP);
        let metadata = self
            .platform
            .get_chat_metadata(channel)
            .await
            .map_err(map_upstream)?;
        let history = self
            .platform
            .get_chat_history(channel, limit)
            .await
            .map_err(map_upstream)?;

        let mut rendered = Vec::with_capacity(history.len());
        for message in &history {
            let naked = message.media_group_id.is_some();
            match self.renderer.render(message, naked).await {
                Ok(post) => rendered.push(post),
                Err(err) => warn!(
                    target = SOURCE,
                    channel = %channel,
                    post_id = message.id,
                    error = %err,
                    "post render failed, skipped"
                ),
            }
        }

        let mut posts = merge_media_groups(rendered, &self.renderer);
        posts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        Ok(build_rss(channel, &metadata, &posts, self.renderer.policy()))
    }
}

fn map_upstream(err: PlatformError) -> FeedError {
    match err {
        PlatformError::NotFound => FeedError::NotFound,
        other => FeedError::Upstream(other),
    }
}

/// Merge media-group members in arrival order: the group keeps the first
/// title that is not a generic media label and concatenates every member's
/// (naked) body, wrapped once.
fn merge_media_groups(posts: Vec<RenderedPost>, renderer: &RenderService) -> Vec<RenderedPost> {
    let mut merged: Vec<RenderedPost> = Vec::with_capacity(posts.len());

    for post in posts {
        let Some(group_id) = post.media_group_id.clone() else {
            merged.push(post);
            continue;
        };

        match merged
            .iter_mut()
            .find(|existing| existing.media_group_id.as_deref() == Some(group_id.as_str()))
        {
            Some(group) => {
                if is_generic_label(&group.title) && !is_generic_label(&post.title) {
                    group.title = post.title;
                }
                group.html.push_str(&post.html);
                if !post.plain_text.is_empty() {
                    if !group.plain_text.is_empty() {
                        group.plain_text.push('\n');
                    }
                    group.plain_text.push_str(&post.plain_text);
                }
                group.flags.extend(post.flags);
            }
            None => merged.push(post),
        }
    }

    for post in &mut merged {
        if post.media_group_id.is_some() {
            post.html = renderer.wrap_merged(&post.html);
        }
    }

    merged
}

fn build_rss(
    channel: &str,
    metadata: &ChatMetadata,
    posts: &[RenderedPost],
    policy: &crate::application::render::RenderPolicy,
) -> String {
    let channel_link = format!("https://{}/{}", policy.platform_domain, channel);

    let mut items = String::new();
    for post in posts {
        let published = OffsetDateTime::from_unix_timestamp(post.timestamp)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        let pub_date = published
            .format(&Rfc2822)
            .unwrap_or_else(|_| published.to_string());
        let link = format!("{channel_link}/{}", post.post_id);
        items.push_str(&format!(
            "    <item>\n      <title>{}</title>\n      <link>{}</link>\n      <guid>{}</guid>\n      <pubDate>{}</pubDate>\n      <description><![CDATA[{}]]></description>\n    </item>\n",
            xml_escape(&post.title),
            link,
            link,
            pub_date,
            post.html,
        ));
    }

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss version=\"2.0\">\n  <channel>\n    <title>{}</title>\n    <link>{}</link>\n    <description>{}</description>\n{}  </channel>\n</rss>\n",
        xml_escape(&metadata.title),
        channel_link,
        xml_escape(metadata.description.as_deref().unwrap_or_default()),
        items
    )
}

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use async_trait::async_trait;

    use crate::application::render::RenderPolicy;
    use crate::application::signing::SigningService;
    use crate::domain::message::{MediaItem, Message, MessageContent};

    use super::*;

    struct ScriptedPlatform {
        messages: Vec<Message>,
    }

    #[async_trait]
    impl PlatformClient for ScriptedPlatform {
        async fn get_message(&self, _channel: &str, id: i64) -> Result<Message, PlatformError> {
            self.messages
                .iter()
                .find(|m| m.id == id)
                .cloned()
                .ok_or(PlatformError::NotFound)
        }

        async fn get_chat_history(
            &self,
            _channel: &str,
            limit: usize,
        ) -> Result<Vec<Message>, PlatformError> {
            Ok(self.messages.iter().take(limit).cloned().collect())
        }

        async fn get_chat_metadata(&self, channel: &str) -> Result<ChatMetadata, PlatformError> {
            Ok(ChatMetadata {
                title: format!("{channel} channel"),
                description: Some("about".to_string()),
            })
        }

        async fn download_content(
            &self,
            _reference: &str,
            _dest: &Path,
        ) -> Result<u64, PlatformError> {
            Ok(0)
        }
    }

    fn photo_message(id: i64, date: i64, text: &str, group: Option<&str>) -> Message {
        Message {
            channel: "chan".to_string(),
            id,
            date,
            author: None,
            views: None,
            media_group_id: group.map(String::from),
            text: text.to_string(),
            forward: None,
            reply_to: None,
            link_preview: None,
            reactions: Vec::new(),
            content: MessageContent::Photo(MediaItem {
                unique_id: format!("uid{id}"),
                reference: format!("ref{id}"),
                width: None,
                height: None,
                mime_type: None,
                file_name: None,
            }),
        }
    }

    fn assembler(messages: Vec<Message>) -> FeedAssembler {
        let dir = tempfile::tempdir().expect("tempdir");
        let key_file = dir.path().join("signing.key");
        std::mem::forget(dir);
        let signing = Arc::new(SigningService::new(key_file, true));
        let renderer = Arc::new(RenderService::new(signing, RenderPolicy::default()));
        FeedAssembler::new(Arc::new(ScriptedPlatform { messages }), renderer)
    }

    #[tokio::test]
    async fn media_group_takes_meaningful_title_and_concatenates() {
        let feed = assembler(vec![
            photo_message(1, 100, "", Some("g1")),
            photo_message(2, 101, "Caption under the second photo", Some("g1")),
        ])
        .assemble("chan", 50)
        .await
        .expect("assemble");

        assert!(feed.contains("<title>Caption under the second photo</title>"));
        assert!(!feed.contains("<title>📷 Photo</title>"));
        // Both members' bodies land in one item, in arrival order.
        assert_eq!(feed.matches("<item>").count(), 1);
        let first = feed.find("uid1").expect("first body");
        let second = feed.find("uid2").expect("second body");
        assert!(first < second);
    }

    #[tokio::test]
    async fn group_of_generic_titles_keeps_first_label() {
        let feed = assembler(vec![
            photo_message(1, 100, "", Some("g1")),
            photo_message(2, 101, "", Some("g1")),
        ])
        .assemble("chan", 50)
        .await
        .expect("assemble");

        assert!(feed.contains("<title>📷 Photo</title>"));
        assert_eq!(feed.matches("<item>").count(), 1);
    }

    #[tokio::test]
    async fn posts_sort_newest_first() {
        let feed = assembler(vec![
            photo_message(1, 100, "Older post with real title text", None),
            photo_message(2, 200, "Newer post with real title text", None),
        ])
        .assemble("chan", 50)
        .await
        .expect("assemble");

        let newer = feed.find("Newer post").expect("newer");
        let older = feed.find("Older post").expect("older");
        assert!(newer < older);
    }

    #[tokio::test]
    async fn channel_metadata_heads_the_feed() {
        let feed = assembler(vec![photo_message(1, 100, "", None)])
            .assemble("chan", 50)
            .await
            .expect("assemble");
        assert!(feed.contains("<title>chan channel</title>"));
        assert!(feed.contains("<description>about</description>"));
        assert!(feed.contains("<link>https://t.me/chan</link>"));
    }

    #[tokio::test]
    async fn grouped_items_are_wrapped_once() {
        let feed = assembler(vec![
            photo_message(1, 100, "", Some("g1")),
            photo_message(2, 101, "", Some("g1")),
        ])
        .assemble("chan", 50)
        .await
        .expect("assemble");
        assert_eq!(feed.matches("<article class=\"post\">").count(), 1);
    }

    #[tokio::test]
    async fn upstream_failure_fails_the_feed() {
        struct FailingPlatform;

        #[async_trait]
        impl PlatformClient for FailingPlatform {
            async fn get_message(
                &self,
                _channel: &str,
                _id: i64,
            ) -> Result<Message, PlatformError> {
                Err(PlatformError::upstream("down"))
            }
            async fn get_chat_history(
                &self,
                _channel: &str,
                _limit: usize,
            ) -> Result<Vec<Message>, PlatformError> {
                Err(PlatformError::upstream("down"))
            }
            async fn get_chat_metadata(
                &self,
                _channel: &str,
            ) -> Result<ChatMetadata, PlatformError> {
                Err(PlatformError::upstream("down"))
            }
            async fn download_content(
                &self,
                _reference: &str,
                _dest: &Path,
            ) -> Result<u64, PlatformError> {
                Err(PlatformError::upstream("down"))
            }
        }

        let dir = tempfile::tempdir().expect("tempdir");
        let key_file = dir.path().join("signing.key");
        std::mem::forget(dir);
        let signing = Arc::new(SigningService::new(key_file, true));
        let renderer = Arc::new(RenderService::new(signing, RenderPolicy::default()));
        let assembler = FeedAssembler::new(Arc::new(FailingPlatform), renderer);

        assert!(matches!(
            assembler.assemble("chan", 10).await,
            Err(FeedError::Upstream(_))
        ));
    }
}
