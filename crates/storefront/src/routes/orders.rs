//! Order route handlers.
//!
//! Shoppers place, read and pay for their own orders; administrators list
//! every order and mark paid orders delivered.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::instrument;

use marigold_core::{
    Money, OrderId, OrderLine, OrderRequest, OrderTotals, OrderWithOwner, PaymentMethod,
    PaymentReceipt, ShippingAddress,
};

use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::{AppJson, RequireAdmin, RequireAuth};
use crate::services::orders::IntentHandle;
use crate::state::AppState;

/// Order submission from the place-order page.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub order_items: Vec<OrderLine>,
    pub shipping_address: Option<ShippingAddress>,
    pub payment_method: Option<String>,
    #[serde(flatten)]
    pub totals: OrderTotals,
}

/// Payment intent request. Only `orderId` decides what is charged.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentRequest {
    pub order_id: OrderId,
    pub total_price: Option<Money>,
}

/// Place an order from an explicit submission.
#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    AppJson(body): AppJson<CreateOrderRequest>,
) -> Result<impl IntoResponse> {
    let payment_method = body
        .payment_method
        .as_deref()
        .map(str::parse::<PaymentMethod>)
        .transpose()?;

    let placed = state
        .order_service()
        .place(OrderRequest {
            owner: user.id,
            lines: body.order_items,
            shipping_address: body.shipping_address,
            payment_method,
            totals: body.totals,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(placed)))
}

/// Every order. Admin only.
#[instrument(skip(state, admin), fields(user_id = %admin.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<Json<Vec<OrderWithOwner>>> {
    Ok(Json(state.order_service().list_all().await?))
}

/// The caller's orders, newest first.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn mine(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<OrderWithOwner>>> {
    Ok(Json(state.order_service().list_mine(&user).await?))
}

/// One order, for its owner or an admin.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderWithOwner>> {
    Ok(Json(state.order_service().get(&user, id).await?))
}

/// Open a card payment for an unpaid order.
#[instrument(skip(state, user, body), fields(user_id = %user.id, order_id = %body.order_id))]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    AppJson(body): AppJson<PaymentIntentRequest>,
) -> Result<Json<IntentHandle>> {
    let handle = state
        .order_service()
        .create_payment_intent(&user, body.order_id, body.total_price)
        .await?;
    Ok(Json(handle))
}

/// Record payment once the processor confirms it.
#[instrument(skip(state, user, receipt), fields(user_id = %user.id))]
pub async fn pay(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
    AppJson(receipt): AppJson<PaymentReceipt>,
) -> Result<Json<OrderWithOwner>> {
    if receipt.external_id.trim().is_empty() {
        return Err(AppError::Validation("Payment id is required".to_owned()));
    }

    add_breadcrumb("checkout", "Payment confirmation", &[("order_id", id.to_string())]);
    let order = state
        .order_service()
        .confirm_payment(&user, id, receipt)
        .await?;
    Ok(Json(order))
}

/// Mark a paid order delivered. Admin only.
#[instrument(skip(state, admin), fields(user_id = %admin.id))]
pub async fn deliver(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderWithOwner>> {
    Ok(Json(state.order_service().mark_delivered(id).await?))
}
