mod app_state;
mod auth;
mod block_requests;
mod cards;
mod config;
mod crypto;
mod db;
mod error;
mod handlers;
#[cfg(test)]
mod test_support;
mod transfers;
mod users;
mod validation;

use axum::{
    Router,
    routing::{get, post},
};
use clap::Parser;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use app_state::AppState;
use auth::TokenService;
use config::Config;
use crypto::AesKey;
use db::init_pool;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bankcards_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse configuration
    let config = Arc::new(Config::parse());

    // Initialize database
    let pool = init_pool(&config.database_url).await?;

    let pan_key = AesKey::from_hex(&config.pan_encryption_key)?;
    let tokens = Arc::new(TokenService::new(
        &config.auth_secret,
        config.token_ttl_minutes,
    ));

    // Create shared state
    let state = AppState {
        pool,
        config: config.clone(),
        pan_key,
        tokens,
    };

    // Build router
    let app = Router::new()
        // Authentication
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        // Cards
        .route("/cards", post(handlers::cards::create).get(handlers::cards::list))
        .route(
            "/cards/{id}",
            get(handlers::cards::get_by_id).delete(handlers::cards::delete),
        )
        .route("/cards/{id}/number", get(handlers::cards::masked_number))
        .route("/cards/{id}/block", post(handlers::cards::block))
        .route("/cards/{id}/unblock", post(handlers::cards::unblock))
        .route("/cards/{id}/deposit", post(handlers::cards::deposit))
        // Transfers
        .route("/transfers", post(handlers::transfers::create))
        // Block requests
        .route(
            "/block-requests",
            post(handlers::block_requests::create).get(handlers::block_requests::list),
        )
        .route("/block-requests/{id}/approve", post(handlers::block_requests::approve))
        .route("/block-requests/{id}/reject", post(handlers::block_requests::reject))
        // User administration
        .route("/users/{id}/enable", post(handlers::users::enable))
        .route("/users/{id}/disable", post(handlers::users::disable))
        // Add middleware
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        // Add shared state
        .with_state(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.socket_addr()).await?;

    tracing::info!("Server running on {}", config.socket_addr());

    axum::serve(listener, app).await?;

    Ok(())
}
