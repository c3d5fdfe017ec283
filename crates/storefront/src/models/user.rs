//! User domain types.
//!
//! These types represent validated domain objects separate from database row types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use marigold_core::{Email, ProductId, UserId};

/// A storefront account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// User's email address. Unique.
    pub email: Email,
    /// Whether the user may use the admin endpoints.
    pub is_admin: bool,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}

/// A user together with their stored password hash, for login only.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    /// The account.
    pub user: User,
    /// Argon2 PHC string.
    pub password_hash: String,
}

/// Data for creating an account.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: Email,
    /// Argon2 PHC string.
    pub password_hash: String,
    /// Whether the account starts as an administrator.
    pub is_admin: bool,
}

/// Profile changes. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    /// New display name.
    pub name: Option<String>,
    /// New email address.
    pub email: Option<Email>,
    /// New argon2 PHC string.
    pub password_hash: Option<String>,
}

/// Outcome of toggling a product on a wishlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WishlistToggle {
    /// `true` if the product was added, `false` if it was removed.
    pub added: bool,
    /// Wishlist after the toggle.
    pub wishlist: Vec<ProductId>,
}

/// Profile as returned to the browser.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// User ID.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: Email,
    /// Admin flag.
    pub is_admin: bool,
    /// Wishlisted product ids.
    pub wishlist: Vec<ProductId>,
}

impl UserProfile {
    /// Build a profile from a user and their wishlist.
    #[must_use]
    pub fn new(user: User, wishlist: Vec<ProductId>) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            is_admin: user.is_admin,
            wishlist,
        }
    }
}
