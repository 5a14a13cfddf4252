use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gatehouse_api::background::visit_sweep;
use gatehouse_api::config::ServerConfig;
use gatehouse_api::router::build_app_router;
use gatehouse_api::state::AppState;
use gatehouse_api::watchlist::{DisabledWatchlist, HttpWatchlist, WatchlistClient};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatehouse_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = gatehouse_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    gatehouse_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    gatehouse_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Event bus + notification dispatcher ---
    let event_bus = Arc::new(gatehouse_events::EventBus::default());
    let dispatcher =
        gatehouse_events::NotificationDispatcher::new(config.notify_webhook_url.clone());
    let dispatcher_handle = tokio::spawn(dispatcher.run(event_bus.subscribe()));
    tracing::info!(
        webhook_configured = config.notify_webhook_url.is_some(),
        "Notification dispatcher started"
    );

    // --- Watchlist client ---
    let watchlist: Arc<dyn WatchlistClient> = match &config.watchlist_url {
        Some(url) => {
            tracing::info!(url = %url, "Watchlist checks enabled");
            Arc::new(HttpWatchlist::new(url.clone()))
        }
        None => {
            tracing::warn!("WATCHLIST_URL not set; check-in watchlist screening is DISABLED");
            Arc::new(DisabledWatchlist)
        }
    };

    // --- Background sweep ---
    let sweep_cancel = tokio_util::sync::CancellationToken::new();
    let sweep_handle = tokio::spawn(visit_sweep::run(
        pool.clone(),
        config.policy.clone(),
        Arc::clone(&event_bus),
        config.sweep_interval_secs,
        sweep_cancel.clone(),
    ));

    // --- App state + router ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        event_bus,
        watchlist,
    };
    let app = build_app_router(state, &config);

    // --- Serve ---
    let addr = SocketAddr::new(config.host.parse().expect("Invalid HOST"), config.port);
    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .expect("Server error");

    // Stop background work before exiting.
    sweep_cancel.cancel();
    let _ = sweep_handle.await;
    dispatcher_handle.abort();
}
