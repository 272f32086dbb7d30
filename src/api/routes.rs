//! HTTP routes configuration

use crate::api::handlers::{self, ApiState};
use axum::{
    http::{StatusCode, Uri},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};

/// Unknown routes get a JSON 404
async fn fallback_handler(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": format!("No route for {}", uri.path()),
            "code": "NOT_FOUND",
        })),
    )
}

/// Create the API router with all routes
pub fn create_router(state: ApiState) -> Router {
    // Configure CORS for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        // Lookup
        .route("/alias", get(handlers::get_alias))
        .route("/aliases", get(handlers::list_aliases))
        // Registration
        .route(
            "/alias-register",
            get(handlers::registration_form).post(handlers::register_alias),
        )
        .fallback(fallback_handler)
        .with_state(state)
        .layer(cors)
}
