//! Account and wishlist persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use marigold_core::{Email, ProductId, UserId};

use super::PgStore;
use crate::db::{RepositoryError, UserStore, conflict_on_unique};
use crate::models::{NewUser, User, UserCredentials, UserUpdate, WishlistToggle};

const USER_COLUMNS: &str = "id, name, email, is_admin, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i32,
    name: String,
    email: String,
    is_admin: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: UserId::new(row.id),
            name: row.name,
            email,
            is_admin: row.is_admin,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CredentialsRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: String,
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r"
            INSERT INTO storefront.user (name, email, password_hash, is_admin)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_admin)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "email already exists"))?;

        row.try_into()
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM storefront.user WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn get_users(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError> {
        let raw: Vec<i32> = ids.iter().map(UserId::as_i32).collect();
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM storefront.user WHERE id = ANY($1)"
        ))
        .bind(raw)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(User::try_from).collect()
    }

    async fn get_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<UserCredentials>, RepositoryError> {
        let row = sqlx::query_as::<_, CredentialsRow>(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM storefront.user WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(UserCredentials {
                user: r.user.try_into()?,
                password_hash: r.password_hash,
            })
        })
        .transpose()
    }

    async fn update_user(&self, id: UserId, update: UserUpdate) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r"
            UPDATE storefront.user
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                password_hash = COALESCE($4, password_hash),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(update.name)
        .bind(update.email)
        .bind(update.password_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "email already exists"))?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    async fn set_admin(&self, email: &Email, is_admin: bool) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r"
            UPDATE storefront.user
            SET is_admin = $2, updated_at = NOW()
            WHERE email = $1
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(email)
        .bind(is_admin)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    async fn wishlist(&self, user: UserId) -> Result<Vec<ProductId>, RepositoryError> {
        let ids: Vec<(ProductId,)> = sqlx::query_as(
            r"
            SELECT product_id FROM storefront.wishlist_item
            WHERE user_id = $1
            ORDER BY added_at, product_id
            ",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn toggle_wishlist(
        &self,
        user: UserId,
        product: ProductId,
    ) -> Result<WishlistToggle, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<(i32,)> =
            sqlx::query_as("SELECT id FROM storefront.product WHERE id = $1")
                .bind(product)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Err(RepositoryError::NotFound);
        }

        let removed = sqlx::query(
            "DELETE FROM storefront.wishlist_item WHERE user_id = $1 AND product_id = $2",
        )
        .bind(user)
        .bind(product)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if !removed {
            sqlx::query(
                r"
                INSERT INTO storefront.wishlist_item (user_id, product_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                ",
            )
            .bind(user)
            .bind(product)
            .execute(&mut *tx)
            .await?;
        }

        let ids: Vec<(ProductId,)> = sqlx::query_as(
            r"
            SELECT product_id FROM storefront.wishlist_item
            WHERE user_id = $1
            ORDER BY added_at, product_id
            ",
        )
        .bind(user)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(WishlistToggle {
            added: !removed,
            wishlist: ids.into_iter().map(|(id,)| id).collect(),
        })
    }
}
