//! Error types for the HTTP server.

use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use serde_json::json;

use mdsync_diagrams::ProxyError;
use mdsync_store::StoreError;
use mdsync_sync::SyncError;

use crate::render;

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ServerError {
    /// No post with this url.
    #[error("Post not found: {0}")]
    PostNotFound(String),

    /// Collection has no posts.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Request body is missing a required value.
    #[error("{0}")]
    BadRequest(String),

    /// Collection is mirrored from the sync root.
    #[error("Collection is managed by sync: {0}")]
    ReadOnlyCollection(String),

    /// Store query failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Manual sync failed.
    #[error("{0}")]
    Sync(#[from] SyncError),

    /// `PlantUML` server unreachable.
    #[error("PlantUML proxy error: {0}")]
    Proxy(#[from] ProxyError),
}

fn not_found_page(what: &str) -> Response {
    let body = render::page(
        "Not found",
        &format!("<h1>404</h1>\n<p>{} not found.</p>\n", render::escape_html(what)),
    );
    (
        StatusCode::NOT_FOUND,
        [(header::CACHE_CONTROL, "no-cache")],
        Html(body),
    )
        .into_response()
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::PostNotFound(url) => return not_found_page(&format!("Post \"{url}\"")),
            Self::CollectionNotFound(name) => {
                return not_found_page(&format!("Collection \"{name}\""));
            }
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, json!({"error": message})),
            Self::ReadOnlyCollection(_) => {
                (StatusCode::CONFLICT, json!({"error": self.to_string()}))
            }
            Self::Store(e) => {
                tracing::error!(error = %e, "Store query failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": e.to_string()}),
                )
            }
            Self::Sync(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"status": "error", "message": e.to_string()}),
            ),
            Self::Proxy(e) => (StatusCode::BAD_GATEWAY, json!({"error": e.to_string()})),
        };

        (status, axum::Json(body)).into_response()
    }
}
