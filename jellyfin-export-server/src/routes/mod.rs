pub mod v1;

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    routing::get,
};
use jellyfin_export_core::api::routes::v1 as paths;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    AppState,
    handlers::health::{health_handler, ping_handler},
};

/// Create the main API router with all versions
pub fn create_api_router(state: AppState) -> Router<AppState> {
    Router::new().nest(paths::ROOT, v1::create_v1_router(state))
}

/// Full application: health checks, versioned API and the HTTP layers.
pub fn create_app(state: AppState) -> Router {
    let versioned_api = create_api_router(state.clone());

    Router::new()
        .route("/ping", get(ping_handler))
        .route("/health", get(health_handler))
        .merge(versioned_api)
        .layer(cors_layer(&state))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Permissive in dev, allow-list otherwise.
fn cors_layer(state: &AppState) -> CorsLayer {
    if state.config().dev_mode {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = state
        .config()
        .cors_allowed_origins
        .iter()
        .filter_map(|s| HeaderValue::from_str(s).ok())
        .collect();
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static("x-request-id")])
}
