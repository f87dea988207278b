use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn customer_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/profile", get(handlers::get_profile))
        .route("/profile", put(handlers::upsert_profile))
        .route("/preferences", get(handlers::list_preferences))
        .route("/preferences/{key}", get(handlers::get_preference))
        .route("/preferences/{key}", put(handlers::set_preference))
        .route("/preferences/{key}", delete(handlers::delete_preference))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
