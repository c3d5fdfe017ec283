//! Session cart handlers.
//!
//! The cart lives in the server session. Lines capture the product's name,
//! image and price when added; quantities are clamped to the stock on hand.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use marigold_core::{Cart, CartLine, CartTotals, ProductId};

use crate::error::{AppError, Result};
use crate::middleware::AppJson;
use crate::models::keys;
use crate::state::AppState;

/// Cart contents with derived totals.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub cart_items: Vec<CartLine>,
    pub item_count: u32,
    #[serde(flatten)]
    pub totals: CartTotals,
}

/// Add or change a cart line.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: ProductId,
    #[serde(default = "one")]
    pub qty: u32,
}

const fn one() -> u32 {
    1
}

// =============================================================================
// Session Helpers
// =============================================================================

/// Load the cart from the session, empty if absent.
pub(crate) async fn load_cart(session: &Session) -> Result<Cart> {
    Ok(session.get::<Cart>(keys::CART).await?.unwrap_or_default())
}

/// Store the cart in the session.
pub(crate) async fn save_cart(session: &Session, cart: &Cart) -> Result<()> {
    session.insert(keys::CART, cart).await?;
    Ok(())
}

fn view(state: &AppState, cart: &Cart) -> CartView {
    CartView {
        cart_items: cart.snapshot(),
        item_count: cart.item_count(),
        totals: cart.totals(&state.config().pricing),
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Show the cart.
#[instrument(skip(state, session))]
pub async fn show(State(state): State<AppState>, session: Session) -> Result<Json<CartView>> {
    let cart = load_cart(&session).await?;
    Ok(Json(view(&state, &cart)))
}

/// Add a product, or set its quantity if it is already in the cart.
#[instrument(skip(state, session))]
pub async fn add_item(
    State(state): State<AppState>,
    session: Session,
    AppJson(body): AppJson<AddItemRequest>,
) -> Result<Json<CartView>> {
    let product = state
        .catalog()
        .get_product(body.product_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_owned()))?;

    if product.count_in_stock == 0 {
        return Err(AppError::Validation("Product is out of stock".to_owned()));
    }
    let qty = body.qty.min(product.count_in_stock);
    if qty < body.qty {
        tracing::debug!(
            product_id = %product.id,
            requested = body.qty,
            in_stock = product.count_in_stock,
            "Quantity clamped to stock"
        );
    }

    let mut cart = load_cart(&session).await?;
    cart.add_or_update(CartLine {
        product_id: product.id,
        name: product.name,
        image: product.image,
        unit_price: product.price,
        quantity: qty,
    })?;
    save_cart(&session, &cart).await?;

    Ok(Json(view(&state, &cart)))
}

/// Remove a product from the cart. Removing an absent product is a no-op.
#[instrument(skip(state, session))]
pub async fn remove_item(
    State(state): State<AppState>,
    session: Session,
    Path(product_id): Path<ProductId>,
) -> Result<Json<CartView>> {
    let mut cart = load_cart(&session).await?;
    if cart.remove(product_id) {
        save_cart(&session, &cart).await?;
    }
    Ok(Json(view(&state, &cart)))
}

/// Empty the cart.
#[instrument(skip(state, session))]
pub async fn clear(State(state): State<AppState>, session: Session) -> Result<Json<CartView>> {
    let cart = Cart::new();
    save_cart(&session, &cart).await?;
    Ok(Json(view(&state, &cart)))
}
