//! Proxy to the `PlantUML` server.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use mdsync_diagrams::ProxyError;

use crate::error::ServerError;
use crate::state::AppState;

/// Rendered diagrams are addressed by their source, so they never go stale.
const DIAGRAM_CACHE_CONTROL: &str = "public, max-age=86400";

/// Handle GET /plantuml/{*path}.
pub(crate) async fn proxy(
    Path(path): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ServerError> {
    let client = state.plantuml.clone();
    let upstream = tokio::task::spawn_blocking(move || client.fetch(&path))
        .await
        .map_err(|e| ProxyError::Io(e.to_string()))??;

    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = upstream
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_owned());

    let mut response = (status, [(header::CONTENT_TYPE, content_type)], upstream.body).into_response();
    if status.is_success() {
        response.headers_mut().insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static(DIAGRAM_CACHE_CONTROL),
        );
    }
    Ok(response)
}
