use std::sync::Arc;

use axum::{routing::get, Router};

use booking_cell::router::booking_routes;
use customer_cell::router::customer_routes;
use notification_cell::router::notification_routes;
use provider_cell::router::provider_routes;
use review_cell::router::review_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Velora booking API is running!" }))
        .nest("/providers", provider_routes(state.clone()))
        .nest("/appointments", booking_routes(state.clone()))
        .nest("/notifications", notification_routes(state.clone()))
        .nest("/reviews", review_routes(state.clone()))
        .nest("/customers", customer_routes(state.clone()))
}
