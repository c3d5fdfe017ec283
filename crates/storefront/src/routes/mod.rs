//! HTTP route handlers for the storefront API.
//!
//! # Route Structure
//!
//! ```text
//! # Auth
//! POST /api/auth/register                 - Create account and sign in
//! POST /api/auth/login                    - Sign in
//! POST /api/auth/logout                   - Sign out
//! GET  /api/auth/me                       - Signed-in user
//!
//! # Users (requires auth)
//! GET  /api/users/profile                 - Profile with wishlist ids
//! PUT  /api/users/profile                 - Update name, email, password
//! GET  /api/users/wishlist                - Wishlisted products
//! POST /api/users/wishlist/{id}           - Toggle wishlist membership
//!
//! # Products
//! GET  /api/products                      - Search and filter, paged
//! POST /api/products                      - Create sample product (admin)
//! GET  /api/products/{id}                 - Product with reviews
//! PUT  /api/products/{id}                 - Update product (admin)
//! DELETE /api/products/{id}               - Delete product (admin)
//! GET  /api/products/{id}/recommendations - Similar products
//! POST /api/products/{id}/reviews         - Add review (auth)
//!
//! # Orders (requires auth)
//! POST /api/orders                        - Place order
//! GET  /api/orders                        - All orders (admin)
//! GET  /api/orders/mine                   - Caller's orders
//! POST /api/orders/create-payment-intent  - Open card payment
//! GET  /api/orders/{id}                   - Order detail (owner or admin)
//! PUT  /api/orders/{id}/pay               - Confirm payment
//! PUT  /api/orders/{id}/deliver           - Mark delivered (admin)
//!
//! # Session cart
//! GET    /api/cart                        - Cart with totals
//! DELETE /api/cart                        - Empty cart
//! POST   /api/cart/items                  - Add or update line
//! DELETE /api/cart/items/{productId}      - Remove line
//!
//! # Checkout
//! GET  /api/checkout                      - Checkout progress
//! PUT  /api/checkout/shipping             - Save address
//! PUT  /api/checkout/payment              - Choose payment method
//! POST /api/checkout/place-order          - Place order from cart (auth)
//! ```

pub mod auth;
pub mod cart;
pub mod checkout;
pub mod orders;
pub mod products;
pub mod users;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::error::AppError;
use crate::middleware::{api_rate_limiter, auth_rate_limiter};
use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
}

/// Create the user routes router.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/profile", get(users::profile).put(users::update_profile))
        .route("/wishlist", get(users::wishlist))
        .route("/wishlist/{id}", post(users::toggle_wishlist))
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index).post(products::create))
        .route(
            "/{id}",
            get(products::show)
                .put(products::update)
                .delete(products::delete),
        )
        .route("/{id}/recommendations", get(products::recommendations))
        .route("/{id}/reviews", post(products::add_review))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index).post(orders::create))
        .route("/mine", get(orders::mine))
        .route(
            "/create-payment-intent",
            post(orders::create_payment_intent),
        )
        .route("/{id}", get(orders::show))
        .route("/{id}/pay", put(orders::pay))
        .route("/{id}/deliver", put(orders::deliver))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).delete(cart::clear))
        .route("/items", post(cart::add_item))
        .route("/items/{id}", axum::routing::delete(cart::remove_item))
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(checkout::show))
        .route("/shipping", put(checkout::save_shipping))
        .route("/payment", put(checkout::save_payment))
        .route("/place-order", post(checkout::place_order))
}

async fn api_not_found() -> AppError {
    AppError::NotFound("Route not found".to_owned())
}

/// Create the `/api` router.
///
/// With `rate_limit` set, auth endpoints get a strict per-IP limit and the
/// rest of the API a relaxed one.
pub fn api_routes(rate_limit: bool) -> Router<AppState> {
    let auth = if rate_limit {
        auth_routes().layer(auth_rate_limiter())
    } else {
        auth_routes()
    };

    let api = Router::new()
        .nest("/auth", auth)
        .nest("/users", user_routes())
        .nest("/products", product_routes())
        .nest("/orders", order_routes())
        .nest("/cart", cart_routes())
        .nest("/checkout", checkout_routes())
        .fallback(api_not_found);

    if rate_limit {
        api.layer(api_rate_limiter())
    } else {
        api
    }
}
