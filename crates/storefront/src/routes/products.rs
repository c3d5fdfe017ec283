//! Catalog route handlers.
//!
//! Listing, detail and recommendations are public. Creating, editing and
//! deleting products is for administrators; reviews need a signed-in user.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use marigold_core::{Money, ProductId};

use crate::db::RepositoryError;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::{AppJson, RequireAdmin, RequireAuth};
use crate::models::{NewProduct, Product, ProductDetail, ProductFilter, ProductPage, ProductUpdate};
use crate::state::AppState;

/// Products suggested alongside a product.
const RECOMMENDATION_LIMIT: u32 = 4;

/// Review submission.
#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub rating: i64,
    #[serde(default)]
    pub comment: String,
}

fn product_not_found(err: RepositoryError) -> AppError {
    match err {
        RepositoryError::NotFound => AppError::NotFound("Product not found".to_owned()),
        other => other.into(),
    }
}

/// A price must be whole cents between zero and the stored maximum.
fn validate_price(price: Money) -> Result<()> {
    if price.is_negative() {
        return Err(AppError::Validation("Price cannot be negative".to_owned()));
    }
    if price.is_sub_cent() {
        return Err(AppError::Validation(
            "Price must have at most two decimal places".to_owned(),
        ));
    }
    if price.exceeds_stored_max() {
        return Err(AppError::Validation(format!(
            "Price cannot exceed {}",
            Money::MAX_STORED
        )));
    }
    Ok(())
}

/// Search and filter the catalog, 24 products per page.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Query(filter): Query<ProductFilter>,
) -> Result<Json<ProductPage>> {
    Ok(Json(state.catalog().list_products(&filter).await?))
}

/// One product with its reviews.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<ProductDetail>> {
    let product = state
        .catalog()
        .get_product(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_owned()))?;
    let reviews = state.catalog().reviews(id).await?;
    Ok(Json(ProductDetail { product, reviews }))
}

/// Up to four other products sharing the category or brand.
#[instrument(skip(state))]
pub async fn recommendations(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Vec<Product>>> {
    let products = state
        .catalog()
        .recommendations(id, RECOMMENDATION_LIMIT)
        .await
        .map_err(product_not_found)?;
    Ok(Json(products))
}

/// Create a placeholder product for the admin to edit.
#[instrument(skip(state, admin), fields(user_id = %admin.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<impl IntoResponse> {
    let product = state
        .catalog()
        .create_product(NewProduct::sample(admin.id))
        .await?;
    tracing::info!(product_id = %product.id, "Product created");
    Ok((StatusCode::CREATED, Json(product)))
}

/// Apply the admin edit form. Blank text fields keep their stored value.
#[instrument(skip(state, admin, update), fields(user_id = %admin.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ProductId>,
    AppJson(update): AppJson<ProductUpdate>,
) -> Result<Json<Product>> {
    if let Some(price) = update.price {
        validate_price(price)?;
    }

    let product = state
        .catalog()
        .update_product(id, update.normalized())
        .await
        .map_err(product_not_found)?;
    tracing::info!(product_id = %id, "Product updated");
    Ok(Json(product))
}

/// Delete a product. Placed orders keep their line snapshots.
#[instrument(skip(state, admin), fields(user_id = %admin.id))]
pub async fn delete(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ProductId>,
) -> Result<impl IntoResponse> {
    state
        .catalog()
        .delete_product(id)
        .await
        .map_err(product_not_found)?;
    tracing::info!(product_id = %id, "Product removed");
    Ok(Json(json!({ "message": "Product removed" })))
}

/// Add the caller's review.
#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn add_review(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ProductId>,
    AppJson(body): AppJson<ReviewRequest>,
) -> Result<impl IntoResponse> {
    let (_, summary) = state
        .review_service()
        .add(&user, id, body.rating, &body.comment)
        .await?;

    add_breadcrumb("catalog", "Review added", &[("product_id", id.to_string())]);
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Review added",
            "rating": summary.rating,
            "numReviews": summary.num_reviews,
        })),
    ))
}
