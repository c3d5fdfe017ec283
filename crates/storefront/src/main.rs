//! Marigold storefront - JSON API server.
//!
//! This binary serves the storefront API on port 5000 and, when
//! `STOREFRONT_STATIC_DIR` is set, the built browser client.
//!
//! # Architecture
//!
//! - Axum web framework, JSON handlers under `/api`
//! - `PostgreSQL` (or an in-memory store for demos) for accounts, catalog and orders
//! - tower-sessions for the signed-in user, the cart and checkout progress
//! - Stripe payment intents for card payments

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::net::SocketAddr;
use std::sync::Arc;

use sentry::integrations::tracing as sentry_tracing;
use tower_sessions_sqlx_store::PostgresStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use marigold_storefront::app;
use marigold_storefront::config::{StoreBackend, StorefrontConfig};
use marigold_storefront::db::{self, MemoryStore, PgStore, Stores};
use marigold_storefront::services::payments::{PaymentGateway, StripeGateway};
use marigold_storefront::state::AppState;

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR => sentry_tracing::EventFilter::Event,
        tracing::Level::WARN | tracing::Level::INFO => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = StorefrontConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Defaults to info level for our crate if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "marigold_storefront=info,tower_http=debug".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let payments: Arc<dyn PaymentGateway> = Arc::new(
        StripeGateway::new(&config.stripe).expect("Failed to build payment processor client"),
    );
    let addr = config.socket_addr();

    let router = match config.store {
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .clone()
                .expect("database URL is loaded for the postgres backend");
            let pool = db::create_pool(&database_url)
                .await
                .expect("Failed to create database pool");
            tracing::info!("Database pool created");

            // NOTE: Migrations are NOT run automatically on startup.
            // Run them explicitly via: cargo run -p marigold-cli -- migrate
            let session_store = PostgresStore::new(pool.clone());
            let stores = Stores::from_backend(PgStore::new(pool.clone()));
            app(
                AppState::with_pool(config, stores, payments, pool),
                session_store,
            )
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; all data is lost on restart");
            let stores = Stores::from_backend(MemoryStore::new());
            app(
                AppState::new(config, stores, payments),
                tower_sessions::MemoryStore::default(),
            )
        }
    };

    tracing::info!("storefront listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
