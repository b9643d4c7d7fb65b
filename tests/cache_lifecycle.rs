//! End-to-end lifecycle of one piece of content: rendered with a signed URL,
//! resolved into the cache, served with a sniffed type, evicted after the
//! retention window, and re-downloaded on demand.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rivista::application::render::{RenderPolicy, RenderService};
use rivista::application::signing::SigningService;
use rivista::domain::content::ContentKey;
use rivista::domain::message::{ChatMetadata, MediaItem, Message, MessageContent};
use rivista::infra::cache::{ContentCache, ReconcileConfig, Reconciler};
use rivista::infra::platform::{PlatformClient, PlatformError};
use tokio_util::sync::CancellationToken;

const DAY: i64 = 24 * 60 * 60;
const JPEG_PAYLOAD: &[u8] = b"\xFF\xD8\xFF\xE0fake-jpeg-body";

struct FixturePlatform {
    downloads: AtomicUsize,
    message: Message,
}

impl FixturePlatform {
    fn new() -> Self {
        Self {
            downloads: AtomicUsize::new(0),
            message: Message {
                channel: "chan".to_string(),
                id: 7,
                date: 1_700_000_000,
                author: None,
                views: Some(9),
                media_group_id: None,
                text: "An illustrated post about nothing much".to_string(),
                forward: None,
                reply_to: None,
                link_preview: None,
                reactions: Vec::new(),
                content: MessageContent::Photo(MediaItem {
                    unique_id: "AQbD42".to_string(),
                    reference: "transient-ref-1".to_string(),
                    width: Some(800),
                    height: Some(600),
                    mime_type: None,
                    file_name: None,
                }),
            },
        }
    }
}

#[async_trait]
impl PlatformClient for FixturePlatform {
    async fn get_message(&self, _channel: &str, id: i64) -> Result<Message, PlatformError> {
        if id == self.message.id {
            Ok(self.message.clone())
        } else {
            Err(PlatformError::NotFound)
        }
    }

    async fn get_chat_history(
        &self,
        _channel: &str,
        _limit: usize,
    ) -> Result<Vec<Message>, PlatformError> {
        Ok(vec![self.message.clone()])
    }

    async fn get_chat_metadata(&self, channel: &str) -> Result<ChatMetadata, PlatformError> {
        Ok(ChatMetadata {
            title: channel.to_string(),
            description: None,
        })
    }

    async fn download_content(&self, _reference: &str, dest: &Path) -> Result<u64, PlatformError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(dest, JPEG_PAYLOAD).await?;
        Ok(JPEG_PAYLOAD.len() as u64)
    }
}

struct Fixture {
    platform: Arc<FixturePlatform>,
    signing: Arc<SigningService>,
    renderer: RenderService,
    cache: Arc<ContentCache>,
    _dir: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let platform = Arc::new(FixturePlatform::new());
    let signing = Arc::new(SigningService::new(dir.path().join("signing.key"), true));
    let renderer = RenderService::new(signing.clone(), RenderPolicy::default());
    let cache = Arc::new(
        ContentCache::new(dir.path().join("cache"), platform.clone()).expect("cache init"),
    );
    Fixture {
        platform,
        signing,
        renderer,
        cache,
        _dir: dir,
    }
}

/// Pull the first embedded content URL out of rendered HTML.
fn embedded_content_url(html: &str) -> (ContentKey, String) {
    let start = html.find("/content/").expect("content url in html");
    let rest = &html[start..];
    let url = &rest[..rest.find('"').expect("closing quote")];
    let (path, digest) = url
        .trim_start_matches("/content/")
        .split_once("?digest=")
        .expect("digest parameter");
    let mut parts = path.splitn(3, '/');
    let channel = parts.next().expect("channel");
    let post_id: i64 = parts.next().expect("post id").parse().expect("numeric id");
    let unique_id = parts.next().expect("unique id");
    (
        ContentKey::new(channel, post_id, unique_id),
        digest.to_string(),
    )
}

#[tokio::test]
async fn rendered_url_resolves_serves_and_survives_a_second_resolve() {
    let fx = fixture();

    let post = fx
        .renderer
        .render(&fx.platform.message, false)
        .await
        .expect("render");
    let (key, digest) = embedded_content_url(&post.html);
    assert_eq!(key, ContentKey::new("chan", 7, "AQbD42"));
    assert!(
        fx.signing
            .verify(&key.reference_path(), Some(&digest))
            .await
            .expect("verify")
    );

    let first = fx.cache.resolve(&key).await.expect("first resolve");
    let second = fx.cache.resolve(&key).await.expect("second resolve");
    assert_eq!(first, second);
    assert_eq!(fx.platform.downloads.load(Ordering::SeqCst), 1);

    let (bytes, content_type) = fx.cache.serve(&first).await.expect("serve");
    assert_eq!(content_type, "image/jpeg");
    assert_eq!(&bytes[..], JPEG_PAYLOAD);
}

#[tokio::test]
async fn retention_boundary_evicts_old_entries_only() {
    let fx = fixture();
    let old_key = ContentKey::new("chan", 7, "AQbD42");
    let path = fx.cache.resolve(&old_key).await.expect("resolve");

    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    fx.cache
        .index()
        .touch(&old_key, now - 21 * DAY)
        .await
        .expect("age entry");

    let reconciler = Reconciler::new(
        fx.cache.clone(),
        ReconcileConfig {
            interval: Duration::from_millis(10),
            refetch_delay: Duration::from_millis(1),
            ..ReconcileConfig::default()
        },
    );
    let report = reconciler
        .run_cycle(&CancellationToken::new())
        .await
        .expect("cycle");
    assert_eq!(report.reclaimed, 1);
    assert!(!tokio::fs::try_exists(&path).await.expect("probe"));
    assert!(
        fx.cache
            .index()
            .snapshot()
            .await
            .expect("snapshot")
            .is_empty()
    );

    // 19 days old stays.
    let _ = fx.cache.resolve(&old_key).await.expect("re-resolve");
    fx.cache
        .index()
        .touch(&old_key, now - 19 * DAY)
        .await
        .expect("age entry");
    let report = reconciler
        .run_cycle(&CancellationToken::new())
        .await
        .expect("cycle");
    assert_eq!(report.reclaimed, 0);
    assert!(tokio::fs::try_exists(&path).await.expect("probe"));
}

#[tokio::test]
async fn eviction_then_access_downloads_again() {
    let fx = fixture();
    let key = ContentKey::new("chan", 7, "AQbD42");
    fx.cache.resolve(&key).await.expect("resolve");
    assert_eq!(fx.platform.downloads.load(Ordering::SeqCst), 1);

    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    fx.cache
        .index()
        .touch(&key, now - 30 * DAY)
        .await
        .expect("age entry");
    Reconciler::new(fx.cache.clone(), ReconcileConfig::default())
        .run_cycle(&CancellationToken::new())
        .await
        .expect("cycle");

    fx.cache.resolve(&key).await.expect("resolve after evict");
    assert_eq!(fx.platform.downloads.load(Ordering::SeqCst), 2);
}
