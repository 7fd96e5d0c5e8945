//! Collection endpoints: landing page, JSON listings and collection pages.

use std::fmt::Write;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Response;
use serde::Serialize;

use mdsync_store::Post;

use crate::error::ServerError;
use crate::handlers::html_page;
use crate::render;
use crate::state::AppState;

/// Entry of GET /collections.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CollectionInfo {
    /// Full collection name.
    name: String,
    /// Whether the collection is mirrored from the sync root.
    auto_sync: bool,
}

/// Handle GET /.
pub(crate) async fn index_page(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ServerError> {
    let collections = state.store.list_collections().await?;

    let mut markdown = String::from("# Collections\n\n");
    if collections.is_empty() {
        markdown.push_str("No documents yet.\n");
    }
    // Angle brackets keep names with spaces a single link destination
    for name in &collections {
        let _ = writeln!(markdown, "- [{name}](</content/{name}>)");
    }

    Ok(html_page(
        &state.version,
        &headers,
        "Collections",
        &render::markdown_to_html(&markdown),
    ))
}

/// Handle GET /collections.
pub(crate) async fn list_collections(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CollectionInfo>>, ServerError> {
    let collections = state.store.list_collections().await?;
    Ok(Json(
        collections
            .into_iter()
            .map(|name| CollectionInfo {
                auto_sync: state.mapper.is_namespaced(&name),
                name,
            })
            .collect(),
    ))
}

/// Handle GET /api/collection/{*name}.
pub(crate) async fn get_collection_posts(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Post>>, ServerError> {
    let posts = state
        .store
        .list_by_collection(name.trim_matches('/'))
        .await?;
    Ok(Json(posts))
}

/// Handle GET /content/{*collection}.
///
/// Shows the collection's index document, or a listing of its posts.
pub(crate) async fn get_collection_content(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ServerError> {
    let collection = state.resolve_collection(&name);

    if let Some(index) = state.store.find_index(&collection).await? {
        let html = render::render_body(&index.body);
        return Ok(html_page(&state.version, &headers, &index.title, &html));
    }

    let posts = state.store.list_by_collection(&collection).await?;
    if posts.is_empty() {
        return Err(ServerError::CollectionNotFound(collection));
    }
    let listing = render::collection_listing(
        &collection,
        posts.iter().map(|p| (p.title.as_str(), p.url.as_str())),
    );

    Ok(html_page(
        &state.version,
        &headers,
        &collection,
        &render::render_body(&listing),
    ))
}
