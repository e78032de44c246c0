//! Health check endpoint
//!
//! Simple liveness probe for monitoring.

use axum::Json;
use serde_json::{json, Value};

/// Basic health check (always returns OK if the server is running)
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
