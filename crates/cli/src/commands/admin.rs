//! Administrator management commands.
//!
//! # Usage
//!
//! ```bash
//! # Create a new administrator
//! mg-cli admin create -e admin@example.com -n "Admin Name" -p "long password"
//!
//! # Grant admin rights to an account that registered through the storefront
//! mg-cli admin promote -e shopper@example.com
//! ```

use marigold_core::{Email, EmailError, UserId};
use marigold_storefront::db::{PgStore, RepositoryError, UserStore};
use marigold_storefront::services::auth::{AuthError, AuthService};
use thiserror::Error;

use super::{ConnectError, connect};

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Could not connect.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Account could not be created.
    #[error("Could not create account: {0}")]
    Auth(#[from] AuthError),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// No account uses the email.
    #[error("No account found with email: {0}")]
    UnknownEmail(String),

    /// Database error.
    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Create a new administrator account.
///
/// # Returns
///
/// The ID of the created account.
pub async fn create_user(email: &str, name: &str, password: &str) -> Result<UserId, AdminError> {
    let store = PgStore::new(connect().await?);

    tracing::info!("Creating administrator: {}", email);
    let user = AuthService::new(&store)
        .create_account(name, email, password, true)
        .await?;

    tracing::info!(
        "Administrator created successfully! ID: {}, Email: {}",
        user.id,
        user.email
    );

    Ok(user.id)
}

/// Grant admin rights to an existing account.
pub async fn promote(email: &str) -> Result<(), AdminError> {
    let email = Email::parse(email)?;
    let store = PgStore::new(connect().await?);

    let user = store.set_admin(&email, true).await.map_err(|e| match e {
        RepositoryError::NotFound => AdminError::UnknownEmail(email.to_string()),
        other => AdminError::Repository(other),
    })?;

    tracing::info!("{} ({}) is now an administrator", user.name, user.email);
    Ok(())
}
