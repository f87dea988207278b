use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn provider_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::create_provider))
        .route("/{provider_id}", get(handlers::get_provider))
        .route("/{provider_id}/constraints", patch(handlers::update_constraints))
        .route("/{provider_id}/working-hours", put(handlers::upsert_working_hours))
        .route("/{provider_id}/working-hours", get(handlers::get_working_hours))
        .route("/{provider_id}/blocked-dates", post(handlers::create_blocked_date))
        .route("/{provider_id}/blocked-dates/{blocked_date_id}", delete(handlers::delete_blocked_date))
        .route("/{provider_id}/services", post(handlers::create_service))
        .route("/{provider_id}/services", get(handlers::list_services))
        .route("/{provider_id}/services/{service_id}", put(handlers::update_service))
        .route("/{provider_id}/staff", post(handlers::create_staff))
        .route("/{provider_id}/staff", get(handlers::list_staff))
        .route("/{provider_id}/staff/{staff_id}", put(handlers::update_staff))
        .route("/{provider_id}/staff/{staff_id}/metrics", get(handlers::staff_metrics))
        .route("/{provider_id}/cancellation-policy", get(handlers::get_cancellation_policy))
        .route("/{provider_id}/cancellation-policy", put(handlers::set_cancellation_policy))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
