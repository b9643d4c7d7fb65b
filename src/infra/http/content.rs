use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::Deserialize;

use crate::application::error::AppError;
use crate::domain::content::ContentKey;

use super::HttpState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct DigestQuery {
    digest: Option<String>,
}

pub(super) async fn serve_content(
    State(state): State<HttpState>,
    Path((channel, post_id, unique_id)): Path<(String, i64, String)>,
    Query(query): Query<DigestQuery>,
) -> Result<Response, AppError> {
    let key = ContentKey::new(channel, post_id, unique_id);
    let authorized = state
        .signing
        .verify(&key.reference_path(), query.digest.as_deref())
        .await?;
    if !authorized {
        return Err(AppError::ForbiddenDigest);
    }

    let path = state.cache.resolve(&key).await?;
    let (bytes, content_type) = state.cache.serve(&path).await?;
    Ok(content_response(bytes, content_type))
}

fn content_response(bytes: Bytes, content_type: &'static str) -> Response {
    let length = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}
