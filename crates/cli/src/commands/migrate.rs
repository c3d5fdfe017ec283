//! Database migration command.
//!
//! Runs the storefront schema migrations in `crates/storefront/migrations/`,
//! then creates the session table used by `tower-sessions-sqlx-store`.
//!
//! ```bash
//! mg-cli migrate
//! ```

use thiserror::Error;
use tower_sessions_sqlx_store::PostgresStore;

use super::{ConnectError, connect};

/// Errors that can occur while migrating.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Could not connect.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// A schema migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The session table could not be created.
    #[error("Session store migration error: {0}")]
    Sessions(#[from] sqlx::Error),
}

/// Run storefront and session-store migrations.
pub async fn run() -> Result<(), MigrationError> {
    let pool = connect().await?;

    tracing::info!("Running storefront migrations...");
    sqlx::migrate!("../storefront/migrations").run(&pool).await?;

    tracing::info!("Creating session store table...");
    PostgresStore::new(pool).migrate().await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
