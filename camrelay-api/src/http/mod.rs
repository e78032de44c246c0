// Module: http
// HTTP surface of the relay: the stream endpoint and a health probe.

pub mod error;
pub mod health;
pub mod stream;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use camrelay_core::Config;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
}

/// Create the HTTP router with all routes
pub fn create_router(config: Arc<Config>) -> Router {
    let state = AppState { config };

    Router::new()
        .route("/stream", get(stream::handle_stream))
        .route("/health", get(health::health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
