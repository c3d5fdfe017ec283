//! Marigold Core - domain types and checkout rules.
//!
//! This crate holds everything about the storefront that can be decided without
//! touching a network or a database:
//!
//! - [`types`] - typed ids, [`Email`], [`Money`] and order status values
//! - [`cart`] - the Cart Aggregator (lines plus derived totals)
//! - [`checkout`] - the Checkout Step Guard and the checkout session object
//! - [`order`] - order records, creation validation and the pay/deliver transitions
//! - [`review`] - ratings and the running rating summary of a product
//!
//! The `storefront` crate persists these types and exposes them over HTTP.
//! Enable the `postgres` feature to get `sqlx` encode/decode impls for the
//! newtypes.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod checkout;
pub mod order;
pub mod review;
pub mod types;

pub use cart::{Cart, CartError, CartLine, CartTotals, PricingConfig};
pub use checkout::{
    CheckoutError, CheckoutSession, CheckoutStep, MissingStep, PaymentMethod, ShippingAddress,
};
pub use order::{
    NewOrder, Order, OrderLine, OrderOwner, OrderRequest, OrderTotals, OrderValidationError,
    OrderWithOwner, PaymentReceipt, TransitionError,
};
pub use review::{NewReview, Rating, RatingError, RatingSummary, Review};
pub use types::*;
