//! HTTP request handlers.

pub(crate) mod collections;
pub(crate) mod manual;
pub(crate) mod plantuml;
pub(crate) mod posts;
pub(crate) mod sync;

use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};

use crate::render;

/// Wrap rendered HTML in the page shell, honoring `If-None-Match`.
pub(crate) fn html_page(version: &str, headers: &HeaderMap, title: &str, content: &str) -> Response {
    let html = render::page(title, content);
    let etag = render::compute_etag(version, &html);

    if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH)
        && if_none_match.as_bytes() == etag.as_bytes()
    {
        return StatusCode::NOT_MODIFIED.into_response();
    }

    (
        [
            (header::ETAG, etag),
            (header::CACHE_CONTROL, "no-cache".to_owned()),
        ],
        Html(html),
    )
        .into_response()
}
