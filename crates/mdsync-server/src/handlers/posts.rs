//! Single post page.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Response;

use crate::error::ServerError;
use crate::handlers::html_page;
use crate::render;
use crate::state::AppState;

/// Handle GET /post/{name}.
pub(crate) async fn get_post(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ServerError> {
    let post = state
        .store
        .find_by_url(&name)
        .await?
        .ok_or(ServerError::PostNotFound(name))?;

    let html = render::render_body(&post.body);
    Ok(html_page(&state.version, &headers, &post.title, &html))
}
