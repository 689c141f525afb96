mod api;
mod config;
mod db;
mod error;
mod middleware;
mod models;
mod ratelimit;
mod services;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{StatusCode, Uri},
    response::IntoResponse,
    routing::get,
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::Database;
use crate::ratelimit::{MemoryRateLimitStore, RateLimitStore, RedisRateLimitStore};
use crate::services::StripeClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "community_api=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    tracing::info!("Configuration loaded successfully");

    // Initialize database connections
    let db = Database::connect(&config).await?;
    tracing::info!("Database connections established");

    // Run database migrations
    db.run_migrations().await?;

    // Rate-limit counters: shared atomic store when running multiple
    // instances, in-process map otherwise
    let rate_limiter: Arc<dyn RateLimitStore> = if config.rate_limit.distributed {
        Arc::new(RedisRateLimitStore::new(
            db.redis.clone(),
            config.rate_limit.window_secs,
            config.rate_limit.max_requests,
        ))
    } else {
        Arc::new(MemoryRateLimitStore::new(
            Duration::from_secs(config.rate_limit.window_secs),
            config.rate_limit.max_requests,
        ))
    };

    let stripe = StripeClient::new(config.stripe.clone());

    // Build application state
    let state = AppState {
        db,
        config: config.clone(),
        stripe,
        rate_limiter,
    };

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/auth/callback", get(api::callback))
        .nest("/api", api::routes(&state))
        .fallback(page_fallback)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::gate_pages,
        ))
        .layer(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

/// Page paths the deployed frontend owns. The server only decides gating;
/// rendering happens client-side.
fn is_known_page(path: &str) -> bool {
    matches!(
        path,
        "/" | "/about" | "/login" | "/signup" | "/payment" | "/payment/success" | "/reset-password"
    ) || middleware::requires_membership(path)
}

async fn page_fallback(uri: Uri) -> impl IntoResponse {
    if is_known_page(uri.path()) {
        StatusCode::OK.into_response()
    } else {
        (StatusCode::NOT_FOUND, "404 Not Found").into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
    pub stripe: StripeClient,
    pub rate_limiter: Arc<dyn RateLimitStore>,
}
