//! Router definition for the share API.

use crate::common::config::ServerSettings;
use crate::server::handlers;
use crate::server::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::*,
    Router,
};
use tower_http::cors::{Any, CorsLayer};

/// Build the router for the share API.
pub fn create_router(state: AppState, settings: &ServerSettings) -> Router {
    let router = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/setup", post(handlers::setup))
        .route("/api/status", get(handlers::status))
        .route("/api/files", get(handlers::list_files))
        .route("/api/download/*path", get(handlers::download))
        .route("/api/preview/*path", get(handlers::preview))
        .route("/api/upload", post(handlers::upload))
        .with_state(state)
        .layer(DefaultBodyLimit::max(settings.max_upload_bytes()));

    match cors_layer(&settings.cors_origins) {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

/// Wildcard origins never carry credentials; browsers send Basic auth
/// cross-origin only to an explicitly listed origin.
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([header::CONTENT_DISPOSITION]);

    if origins.iter().any(|origin| origin == "*") {
        return Some(cors.allow_origin(Any));
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    Some(cors.allow_origin(allowed).allow_credentials(true))
}
