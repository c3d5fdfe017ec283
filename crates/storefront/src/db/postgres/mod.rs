//! `PostgreSQL` implementation of the store traits.
//!
//! Queries are built at runtime with `sqlx::query_as` and mapped through
//! `#[derive(sqlx::FromRow)]` row types, then converted to domain types with
//! `TryFrom` so bad data surfaces as [`RepositoryError::DataCorruption`].

mod catalog;
mod orders;
mod users;

use sqlx::PgPool;

use super::RepositoryError;

/// Store backed by the `storefront` schema.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Convert a non-negative database integer.
fn to_u32(value: i32, column: &str) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::DataCorruption(format!("negative {column}: {value}")))
}
