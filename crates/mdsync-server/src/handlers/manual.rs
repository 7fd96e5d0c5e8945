//! Manually managed documents.
//!
//! Posts written here live outside the sync namespace, so the sync engine never
//! touches them and these endpoints refuse to write into synced collections.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use mdsync_store::{Post, UpsertOutcome};
use mdsync_sync::BusMessage;

use crate::error::ServerError;
use crate::state::AppState;

/// Namespace of collections created through the API.
const UPLOADED_NAMESPACE: &str = "uploaded";

/// Body of POST /add.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AddPostRequest {
    collection: String,
    url: String,
    title: String,
    body: String,
    #[serde(default)]
    is_index: bool,
}

/// Body of POST /api/collection/create.
#[derive(Debug, Deserialize)]
pub(crate) struct CreateCollectionRequest {
    name: String,
}

/// Response of the manual write endpoints.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ManualResponse {
    status: &'static str,
    collection: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    created: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deleted: Option<u64>,
}

impl ManualResponse {
    fn success(collection: String) -> Self {
        Self {
            status: "success",
            collection,
            created: None,
            deleted: None,
        }
    }
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, ServerError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ServerError::BadRequest(format!("{field} is required")));
    }
    Ok(value)
}

/// Reject writes into collections the sync engine owns.
fn writable(state: &AppState, collection: &str) -> Result<(), ServerError> {
    if state.mapper.is_namespaced(collection) {
        return Err(ServerError::ReadOnlyCollection(collection.to_owned()));
    }
    Ok(())
}

fn notify(state: &AppState, collection: &str) {
    let outcome = state.bus.broadcast(BusMessage::Reload);
    tracing::debug!(
        collection,
        delivered = outcome.delivered,
        dropped = outcome.dropped,
        "Reload broadcast after manual change"
    );
}

/// Handle POST /add.
///
/// Inserts or replaces one post, then tells live-reload subscribers.
pub(crate) async fn add_post(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddPostRequest>,
) -> Result<Json<ManualResponse>, ServerError> {
    let collection = required("collection", request.collection.trim_matches('/'))?;
    let url = required("url", &request.url)?;
    let title = required("title", &request.title)?;
    writable(&state, collection)?;

    let mut post = Post::new(collection, url, title, request.body);
    post.is_index = request.is_index;
    let outcome = state.store.upsert(&post).await?;
    tracing::info!(collection = %post.collection, url = %post.url, ?outcome, "Manual post stored");

    notify(&state, &post.collection);
    Ok(Json(ManualResponse {
        created: Some(outcome == UpsertOutcome::Inserted),
        ..ManualResponse::success(post.collection)
    }))
}

/// Handle POST /api/collection/create.
///
/// Collections exist only through their posts, so a placeholder index is stored.
pub(crate) async fn create_collection(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateCollectionRequest>,
) -> Result<Json<ManualResponse>, ServerError> {
    let name = required("name", request.name.trim_matches('/'))?;
    let collection = format!("{UPLOADED_NAMESPACE}/{name}");

    let index = Post::new(
        collection.as_str(),
        format!("{}-index", collection.replace('/', "-")),
        collection.as_str(),
        format!("# {collection}\n\nNew collection created.\n"),
    )
    .into_index();
    let outcome = state.store.upsert(&index).await?;
    tracing::info!(collection = %collection, ?outcome, "Collection created");

    notify(&state, &collection);
    Ok(Json(ManualResponse {
        created: Some(outcome == UpsertOutcome::Inserted),
        ..ManualResponse::success(collection)
    }))
}

/// Handle DELETE /api/collection/{*name}.
///
/// Accepts both `/api/collection/{name}` and `/api/collection/{name}/delete`.
pub(crate) async fn delete_collection(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ManualResponse>, ServerError> {
    let name = name.trim_matches('/');
    let collection = required("name", name.strip_suffix("/delete").unwrap_or(name))?;
    writable(&state, collection)?;

    let deleted = state.store.delete_many(collection).await?;
    if deleted == 0 {
        return Err(ServerError::CollectionNotFound(collection.to_owned()));
    }
    tracing::info!(collection, deleted, "Collection deleted");

    notify(&state, collection);
    Ok(Json(ManualResponse {
        deleted: Some(deleted),
        ..ManualResponse::success(collection.to_owned())
    }))
}
