use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::Deserialize;

use crate::application::error::AppError;

use super::{HttpState, xml_response};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct LimitQuery {
    limit: Option<usize>,
}

pub(super) async fn rss_feed(
    State(state): State<HttpState>,
    Path(channel): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Response, AppError> {
    let limit = query.limit.unwrap_or(state.feed_default_items);
    let xml = state.feed.assemble(&channel, limit).await?;
    Ok(xml_response(xml, "application/rss+xml"))
}
