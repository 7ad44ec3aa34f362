//! # Health Check Handler

use axum::Json;
use serde_json::{json, Value};

/// GET /health
///
/// Always `200 OK` while the process is serving requests.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "webauth-server"
    }))
}
