//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::StorefrontConfig;
use crate::db::{CatalogStore, OrderStore, Stores, UserStore};
use crate::services::auth::AuthService;
use crate::services::orders::OrderService;
use crate::services::payments::PaymentGateway;
use crate::services::reviews::ReviewService;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the stores, the payment gateway and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    stores: Stores,
    payments: Arc<dyn PaymentGateway>,
    pool: Option<PgPool>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `stores` - Order, catalog and user stores
    /// * `payments` - Card processor
    #[must_use]
    pub fn new(
        config: StorefrontConfig,
        stores: Stores,
        payments: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                stores,
                payments,
                pool: None,
            }),
        }
    }

    /// Create state backed by `PostgreSQL`, keeping the pool for readiness checks.
    #[must_use]
    pub fn with_pool(
        config: StorefrontConfig,
        stores: Stores,
        payments: Arc<dyn PaymentGateway>,
        pool: PgPool,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                stores,
                payments,
                pool: Some(pool),
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get the database connection pool, if the `PostgreSQL` backend is in use.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    /// Placed orders.
    #[must_use]
    pub fn orders(&self) -> &dyn OrderStore {
        self.inner.stores.orders.as_ref()
    }

    /// Products and reviews.
    #[must_use]
    pub fn catalog(&self) -> &dyn CatalogStore {
        self.inner.stores.catalog.as_ref()
    }

    /// Accounts and wishlists.
    #[must_use]
    pub fn users(&self) -> &dyn UserStore {
        self.inner.stores.users.as_ref()
    }

    /// Card processor.
    #[must_use]
    pub fn payments(&self) -> &dyn PaymentGateway {
        self.inner.payments.as_ref()
    }

    /// Account service over the user store.
    #[must_use]
    pub fn auth_service(&self) -> AuthService<'_> {
        AuthService::new(self.users())
    }

    /// Order service over the order and user stores and the processor.
    #[must_use]
    pub fn order_service(&self) -> OrderService<'_> {
        OrderService::new(self.orders(), self.users(), self.payments())
    }

    /// Review service over the catalog.
    #[must_use]
    pub fn review_service(&self) -> ReviewService<'_> {
        ReviewService::new(self.catalog())
    }
}
