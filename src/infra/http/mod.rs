//! Thin HTTP front end.
//!
//! Handlers translate service results into responses and nothing else; all
//! business logic lives behind [`HttpState`]'s services.

pub mod content;
pub mod feeds;
pub mod posts;

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::get;

use crate::application::feed::FeedAssembler;
use crate::application::render::RenderService;
use crate::application::signing::SigningService;
use crate::infra::cache::ContentCache;
use crate::infra::platform::PlatformClient;

#[derive(Clone)]
pub struct HttpState {
    pub renderer: Arc<RenderService>,
    pub feed: Arc<FeedAssembler>,
    pub cache: Arc<ContentCache>,
    pub signing: Arc<SigningService>,
    pub platform: Arc<dyn PlatformClient>,
    /// Feed size when the request does not name one.
    pub feed_default_items: usize,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/_health", get(health))
        .route("/rss/{channel}", get(feeds::rss_feed))
        .route(
            "/content/{channel}/{post_id}/{unique_id}",
            get(content::serve_content),
        )
        .route("/{channel}/{post_id}", get(posts::render_post))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

pub(crate) fn xml_response(body: String, content_type: &str) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
