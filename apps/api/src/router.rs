use std::sync::Arc;

use axum::{
    Json,
    Router,
    routing::get,
};
use serde_json::{Value, json};

use appointment_cell::router::appointment_routes;
use provider_cell::router::provider_routes;
use quota_cell::router::quota_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "HealthBridge scheduling API is running!" }))
        .route("/health", get(health))
        .nest("/api/v1/providers", provider_routes(state.clone()))
        .nest("/api/v1/appointments", appointment_routes(state.clone()))
        .nest("/api/v1/quota", quota_routes(state))
}

/// Liveness line for load balancers. No auth, no store round-trip.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "healthbridge-api",
    }))
}
