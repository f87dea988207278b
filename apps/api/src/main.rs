use std::net::SocketAddr;
use std::sync::Arc;

use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use booking_cell::services::SlotLockService;
use notification_cell::services::NotificationSweepService;
use shared_config::AppConfig;
use shared_database::store::StoreClient;

const SWEEP_INTERVAL_SECONDS: u64 = 60;

#[tokio::main]
async fn main() {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Velora booking API server");

    // Load configuration
    let config = AppConfig::from_env();

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Create shared state
    let state = Arc::new(config);

    // Background notification/reminder sweep, independent of request handling
    let sweep = Arc::new(NotificationSweepService::new(&state, SWEEP_INTERVAL_SECONDS));
    tokio::spawn(Arc::clone(&sweep).start());

    // Expired slot locks age out on the same cadence
    let lock_service = SlotLockService::new(Arc::new(StoreClient::new(&state)));
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(SWEEP_INTERVAL_SECONDS));
        loop {
            ticker.tick().await;
            if let Err(e) = lock_service.cleanup_expired_locks().await {
                tracing::warn!("Slot lock cleanup failed: {}", e);
            }
        }
    });

    // Build the application router
    let app = router::create_router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
