//! Persistence for the storefront.
//!
//! # Stores
//!
//! Handlers and services never see a database type. They talk to three traits:
//!
//! - [`OrderStore`] - placed orders and their pay/deliver transitions
//! - [`CatalogStore`] - products, reviews and recommendations
//! - [`UserStore`] - accounts and wishlists
//!
//! Two backends implement all three: [`PgStore`] over `PostgreSQL` (schema
//! `storefront`) and [`MemoryStore`] for tests and local demos.
//!
//! # Concurrency
//!
//! `mark_paid` and `mark_delivered` are single conditional updates, so two
//! concurrent confirmations of the same order produce exactly one payment record.
//! `add_review` relies on a uniqueness constraint rather than a read-then-write.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p marigold-cli -- migrate
//! ```

pub mod memory;
pub mod postgres;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use marigold_core::{
    Email, NewOrder, NewReview, Order, OrderId, PaymentReceipt, ProductId, RatingSummary, Review,
    Transition, UserId,
};

use crate::models::{
    NewProduct, NewUser, Product, ProductFilter, ProductPage, ProductUpdate, User,
    UserCredentials, UserUpdate, WishlistToggle,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// The record is not in a state that allows the change.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

/// Map a unique violation to `Conflict`, anything else to `Database`.
pub(crate) fn conflict_on_unique(err: sqlx::Error, message: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(message.to_owned());
    }
    RepositoryError::Database(err)
}

/// Placed orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a validated order, unpaid and undelivered.
    async fn create(&self, order: NewOrder) -> Result<Order, RepositoryError>;

    /// Fetch one order.
    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Every order, newest first.
    async fn list_all(&self) -> Result<Vec<Order>, RepositoryError>;

    /// One shopper's orders, newest first.
    async fn list_for_owner(&self, owner: UserId) -> Result<Vec<Order>, RepositoryError>;

    /// Record payment unless the order is already paid.
    ///
    /// Returns `Unchanged` with the stored record when it was already paid; the
    /// earlier `paid_at` and receipt are kept. Fails with `NotFound` for unknown ids.
    async fn mark_paid(
        &self,
        id: OrderId,
        receipt: PaymentReceipt,
        at: DateTime<Utc>,
    ) -> Result<Transition<Order>, RepositoryError>;

    /// Record delivery of a paid order.
    ///
    /// Fails with `InvalidState` if unpaid and `NotFound` for unknown ids;
    /// returns `Unchanged` if already delivered.
    async fn mark_delivered(
        &self,
        id: OrderId,
        at: DateTime<Utc>,
    ) -> Result<Transition<Order>, RepositoryError>;
}

/// Products and their reviews.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// One page of products matching `filter`.
    async fn list_products(&self, filter: &ProductFilter) -> Result<ProductPage, RepositoryError>;

    /// Fetch one product.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Fetch several products, skipping ids that do not exist.
    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError>;

    /// Create a product.
    async fn create_product(&self, product: NewProduct) -> Result<Product, RepositoryError>;

    /// Apply a partial update. Fails with `NotFound` for unknown ids.
    async fn update_product(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product, RepositoryError>;

    /// Delete a product and its reviews. Fails with `NotFound` for unknown ids.
    async fn delete_product(&self, id: ProductId) -> Result<(), RepositoryError>;

    /// Up to `limit` other products sharing the category or brand of `id`.
    async fn recommendations(
        &self,
        id: ProductId,
        limit: u32,
    ) -> Result<Vec<Product>, RepositoryError>;

    /// Reviews of a product, oldest first.
    async fn reviews(&self, product: ProductId) -> Result<Vec<Review>, RepositoryError>;

    /// Append a review and recompute the product's rating in one step.
    ///
    /// Fails with `NotFound` if the product does not exist and `Conflict` if the
    /// author already reviewed it; neither changes the product.
    async fn add_review(
        &self,
        review: NewReview,
    ) -> Result<(Review, RatingSummary), RepositoryError>;
}

/// Accounts and wishlists.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create an account. Fails with `Conflict` if the email is taken.
    async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError>;

    /// Fetch one account.
    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// Fetch several accounts, skipping ids that do not exist.
    async fn get_users(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError>;

    /// Fetch an account with its password hash.
    async fn get_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<UserCredentials>, RepositoryError>;

    /// Apply profile changes. Fails with `Conflict` if the new email is taken.
    async fn update_user(&self, id: UserId, update: UserUpdate) -> Result<User, RepositoryError>;

    /// Grant or revoke admin rights by email.
    async fn set_admin(&self, email: &Email, is_admin: bool) -> Result<User, RepositoryError>;

    /// Product ids on the user's wishlist, in the order they were added.
    async fn wishlist(&self, user: UserId) -> Result<Vec<ProductId>, RepositoryError>;

    /// Add the product if absent, remove it if present.
    ///
    /// Fails with `NotFound` if the product does not exist.
    async fn toggle_wishlist(
        &self,
        user: UserId,
        product: ProductId,
    ) -> Result<WishlistToggle, RepositoryError>;
}

/// The three stores, usually backed by one object.
#[derive(Clone)]
pub struct Stores {
    pub orders: Arc<dyn OrderStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub users: Arc<dyn UserStore>,
}

impl Stores {
    /// Use one backend for every store.
    pub fn from_backend<B>(backend: B) -> Self
    where
        B: OrderStore + CatalogStore + UserStore + 'static,
    {
        let backend = Arc::new(backend);
        Self {
            orders: backend.clone(),
            catalog: backend.clone(),
            users: backend,
        }
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
