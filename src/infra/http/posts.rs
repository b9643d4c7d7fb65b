use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::application::error::AppError;
use crate::domain::post::RenderedPost;

use super::HttpState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct FormatQuery {
    format: Option<String>,
}

pub(super) async fn render_post(
    State(state): State<HttpState>,
    Path((channel, post_id)): Path<(String, i64)>,
    Query(query): Query<FormatQuery>,
) -> Result<Response, AppError> {
    let message = state.platform.get_message(&channel, post_id).await?;
    let post = state.renderer.render(&message, false).await?;

    match query.format.as_deref() {
        None | Some("html") => Ok(html_document(&post)),
        Some("json") => Ok(Json(post).into_response()),
        Some(other) => Err(AppError::validation(format!("unknown format `{other}`"))),
    }
}

fn html_document(post: &RenderedPost) -> Response {
    let title = post
        .title
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    let body = format!(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n<title>{title}</title>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        post.html
    );
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/html; charset=utf-8")
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
