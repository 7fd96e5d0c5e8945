//! Router construction.
//!
//! Builds the axum router with all routes and response headers.

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, header};
use axum::routing::{get, post};
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::live_reload;
use crate::state::AppState;

/// Pages carry no inline script or style; the only script is `/live-reload.js`,
/// which opens the `/api/events` socket. Posts may embed remote https images.
const CONTENT_SECURITY_POLICY: &str = "default-src 'none'; \
                                       script-src 'self'; \
                                       img-src 'self' data: https:; \
                                       connect-src 'self' ws: wss:; \
                                       base-uri 'none'; \
                                       form-action 'none'; \
                                       frame-ancestors 'self'";

/// Create the application router.
///
/// # Arguments
///
/// * `state` - Shared application state
pub(crate) fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        .route("/collections", get(handlers::collections::list_collections))
        .route(
            "/api/collection/create",
            post(handlers::manual::create_collection),
        )
        .route(
            "/api/collection/{*name}",
            get(handlers::collections::get_collection_posts)
                .delete(handlers::manual::delete_collection),
        )
        .route("/add", post(handlers::manual::add_post))
        .route(
            "/api/sync",
            get(handlers::sync::run_sync).post(handlers::sync::run_sync),
        )
        .route("/api/sync/status", get(handlers::sync::sync_status));

    // Rendered pages
    let page_routes = Router::new()
        .route("/", get(handlers::collections::index_page))
        .route(
            "/content/{*collection}",
            get(handlers::collections::get_collection_content),
        )
        .route("/post/{name}", get(handlers::posts::get_post));

    // Live reload and diagrams
    let support_routes = Router::new()
        .route("/api/events", get(live_reload::ws_handler))
        .route("/live-reload.js", get(live_reload::script))
        .route("/plantuml/{*path}", get(handlers::plantuml::proxy));

    Router::new()
        .merge(api_routes)
        .merge(page_routes)
        .merge(support_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(SetResponseHeaderLayer::overriding(
                    header::CONTENT_SECURITY_POLICY,
                    HeaderValue::from_static(CONTENT_SECURITY_POLICY),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_FRAME_OPTIONS,
                    HeaderValue::from_static("SAMEORIGIN"),
                )),
        )
        .with_state(state)
}
