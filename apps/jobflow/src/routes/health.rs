use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::service_client::{ServiceClient, ServiceError};
use crate::state::AppState;

/// GET /health
/// Returns a simple status object with service version.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "jobflow"
    }))
}

fn summarize(client: &ServiceClient, result: Result<Value, ServiceError>) -> Value {
    match result {
        Ok(body) => json!({"service": client.kind(), "ok": true, "detail": body}),
        Err(e) => json!({"service": client.kind(), "ok": false, "error": e.to_string()}),
    }
}

/// GET /api/v1/services/health
/// Checks both backends concurrently. Always 200; per-service failures are in the body.
pub async fn services_health_handler(State(state): State<AppState>) -> Json<Value> {
    let (jdw, rar) = tokio::join!(state.jdw.health(), state.rar.health());
    Json(json!({
        "jdw": summarize(&state.jdw, jdw),
        "rar": summarize(&state.rar, rar),
    }))
}
