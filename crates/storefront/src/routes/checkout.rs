//! Checkout handlers.
//!
//! Shipping address, then payment method, then place order. When a step is
//! missing the shopper is sent back to it with `303 See Other` rather than
//! an error.

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_sessions::Session;
use tracing::instrument;

use marigold_core::{
    CheckoutError, CheckoutSession, CheckoutStep, MissingStep, OrderRequest, PaymentMethod,
    ShippingAddress,
};

use super::cart::{load_cart, save_cart};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::{AppJson, RequireAuth};
use crate::models::keys;
use crate::state::AppState;

/// Checkout progress.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutView {
    pub step: CheckoutStep,
    #[serde(flatten)]
    pub session: CheckoutSession,
}

impl From<CheckoutSession> for CheckoutView {
    fn from(session: CheckoutSession) -> Self {
        Self {
            step: session.step(),
            session,
        }
    }
}

/// Payment method choice.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodRequest {
    pub payment_method: String,
}

/// `303 See Other` to the missing step, with a JSON body for API clients.
fn redirect_to(step: MissingStep) -> Response {
    tracing::debug!(missing = %step, "Checkout step missing; redirecting");
    (
        StatusCode::SEE_OTHER,
        [(header::LOCATION, step.path())],
        Json(json!({ "redirect": step.path(), "step": step })),
    )
        .into_response()
}

async fn load_checkout(session: &Session) -> Result<CheckoutSession> {
    Ok(session
        .get::<CheckoutSession>(keys::CHECKOUT)
        .await?
        .unwrap_or_default())
}

async fn save_checkout(session: &Session, checkout: &CheckoutSession) -> Result<()> {
    session.insert(keys::CHECKOUT, checkout).await?;
    Ok(())
}

/// Current checkout progress.
#[instrument(skip(session))]
pub async fn show(session: Session) -> Result<Json<CheckoutView>> {
    Ok(Json(load_checkout(&session).await?.into()))
}

/// Save the shipping address.
#[instrument(skip(session, address))]
pub async fn save_shipping(
    session: Session,
    AppJson(address): AppJson<ShippingAddress>,
) -> Result<Json<CheckoutView>> {
    let mut checkout = load_checkout(&session).await?;
    checkout.submit_address(address)?;
    save_checkout(&session, &checkout).await?;
    Ok(Json(checkout.into()))
}

/// Choose the payment method. Requires a shipping address first.
#[instrument(skip(session))]
pub async fn save_payment(
    session: Session,
    AppJson(body): AppJson<PaymentMethodRequest>,
) -> Result<Response> {
    let method: PaymentMethod = body.payment_method.parse()?;
    let mut checkout = load_checkout(&session).await?;

    match checkout.select_payment_method(method) {
        Ok(()) => {}
        Err(CheckoutError::StepMissing(step)) => return Ok(redirect_to(step)),
        Err(e) => return Err(e.into()),
    }
    save_checkout(&session, &checkout).await?;
    Ok(Json(CheckoutView::from(checkout)).into_response())
}

/// Place an order from the session cart.
///
/// The cart is cleared only after the order is stored.
#[instrument(skip(state, session, user), fields(user_id = %user.id))]
pub async fn place_order(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
) -> Result<Response> {
    let mut checkout = load_checkout(&session).await?;
    let (address, method) = match checkout.ready_to_place() {
        Ok((address, method)) => (address.clone(), method),
        Err(step) => return Ok(redirect_to(step)),
    };

    let mut cart = load_cart(&session).await?;
    if cart.is_empty() {
        return Err(AppError::Validation("Your cart is empty".to_owned()));
    }

    let placed = state
        .order_service()
        .place(OrderRequest {
            owner: user.id,
            lines: cart.snapshot(),
            shipping_address: Some(address),
            payment_method: Some(method),
            totals: cart.totals(&state.config().pricing),
        })
        .await?;

    cart.clear();
    save_cart(&session, &cart).await?;
    checkout.mark_ordered(placed.order.id);
    save_checkout(&session, &checkout).await?;

    add_breadcrumb(
        "checkout",
        "Order placed",
        &[("order_id", placed.order.id.to_string())],
    );
    Ok((StatusCode::CREATED, Json(placed)).into_response())
}
