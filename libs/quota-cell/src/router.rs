use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn quota_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/me", get(handlers::get_my_quota))
        .route("/check", get(handlers::check_quota))
        .route("/plans", get(handlers::list_plans))
        .route("/upgrade", post(handlers::upgrade_plan))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
