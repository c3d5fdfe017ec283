//! Profile and wishlist handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use marigold_core::ProductId;

use crate::error::{AppError, Result};
use crate::db::RepositoryError;
use crate::middleware::{AppJson, RequireAuth};
use crate::models::{CurrentUser, Product, UserProfile, keys};
use crate::state::AppState;

/// Profile changes. Blank or missing fields keep the stored value.
#[derive(Deserialize, Default)]
pub struct ProfileUpdateRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Wishlist toggle result.
#[derive(Debug, Serialize)]
pub struct WishlistResponse {
    pub message: &'static str,
    pub wishlist: Vec<ProductId>,
}

/// The caller's profile with wishlist ids.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn profile(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<UserProfile>> {
    let stored = state
        .users()
        .get_user(user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_owned()))?;
    let wishlist = state.users().wishlist(user.id).await?;
    Ok(Json(UserProfile::new(stored, wishlist)))
}

/// Update name, email or password.
#[instrument(skip(state, session, user, body), fields(user_id = %user.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    AppJson(body): AppJson<ProfileUpdateRequest>,
) -> Result<Json<UserProfile>> {
    let updated = state
        .auth_service()
        .update_profile(
            user.id,
            body.name.as_deref(),
            body.email.as_deref(),
            body.password.as_deref(),
        )
        .await?;

    // Keep the session copy in step with the stored profile
    session
        .insert(keys::CURRENT_USER, CurrentUser::from(&updated))
        .await?;

    let wishlist = state.users().wishlist(updated.id).await?;
    tracing::info!("Profile updated");
    Ok(Json(UserProfile::new(updated, wishlist)))
}

/// Add the product to the wishlist, or remove it if already there.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn toggle_wishlist(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(product_id): Path<ProductId>,
) -> Result<Json<WishlistResponse>> {
    let toggle = state
        .users()
        .toggle_wishlist(user.id, product_id)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => {
                AppError::NotFound("Product not found".to_owned())
            }
            other => other.into(),
        })?;

    let message = if toggle.added {
        "Added to wishlist"
    } else {
        "Removed from wishlist"
    };
    Ok(Json(WishlistResponse {
        message,
        wishlist: toggle.wishlist,
    }))
}

/// The wishlisted products, in the order they were added.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn wishlist(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Product>>> {
    let ids = state.users().wishlist(user.id).await?;
    let mut products = state.catalog().get_products(&ids).await?;
    products.sort_by_key(|p| ids.iter().position(|id| *id == p.id));
    Ok(Json(products))
}
