pub mod upload;

use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::utils::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let config = state.config.clone();
    let router = Router::new()
        .route("/health", get(|| async { StatusCode::OK.into_response() }))
        .nest("/upload", upload::create_upload_router(config.max_chunk_bytes))
        .layer(TraceLayer::new_for_http());

    let router = if config.cors_origins.is_empty() {
        router
    } else {
        router.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(config.cors_origins.iter().cloned()))
                .allow_methods(Any)
                .allow_headers(Any),
        )
    };
    router.with_state(state)
}
