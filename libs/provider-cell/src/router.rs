use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn provider_routes(state: Arc<AppConfig>) -> Router {
    // All provider schedule routes require authentication.
    let protected_routes = Router::new()
        .route("/{provider_id}/availability", get(handlers::get_provider_availability))
        .route("/{provider_id}/availability", put(handlers::set_provider_availability))
        .route("/{provider_id}/slots", get(handlers::get_provider_slots))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
