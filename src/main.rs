//! SMM Wallet Server - Main Application Entry Point
//!
//! REST API for a reseller storefront's wallet: SMS-driven payment
//! reconciliation, wallet-funded orders against an upstream SMM panel, and
//! admin tooling for the cases automation cannot settle.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx, or an in-memory store when
//!   `DATABASE_URL` is unset
//! - **Authentication**: API key with SHA-256 hashing; shared secret for the SMS webhook
//! - **Format**: JSON requests/responses
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Open the store (create pool and run migrations when using PostgreSQL)
//! 3. Ensure the bootstrap admin exists, if configured
//! 4. Build HTTP router with routes and middleware
//! 5. Start server on configured port

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use smm_wallet_server::{
    AppState, build_router,
    config::Config,
    db,
    services::{admin_service, provider::HttpProvider},
    store,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default "info" filter
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    if config.sms_webhook_secret.is_none() {
        tracing::warn!("SMS_WEBHOOK_SECRET is not set; SMS webhook deliveries will be refused");
    }

    let store = match config.database_url.as_deref() {
        Some(url) => {
            let pool = db::create_pool(url).await?;
            tracing::info!("Database pool created");
            db::run_migrations(&pool).await?;
            tracing::info!("Database migrations complete");
            store::postgres(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL is not set; using the in-memory store, data is lost on exit");
            store::memory()
        }
    };

    if let Some(key) = config.bootstrap_admin_key.as_deref() {
        admin_service::ensure_admin(store.as_ref(), key)
            .await
            .context("bootstrap admin")?;
    }

    let provider = HttpProvider::from_config(&config)?;
    if !provider.is_configured() {
        tracing::warn!("PROVIDER_API_URL or PROVIDER_API_KEY missing; orders will fail");
    }

    let addr = format!("0.0.0.0:{}", config.server_port);
    let app = build_router(AppState::new(store, Arc::new(provider), config));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
