//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - Account registration, login and profile changes
//! - `orders` - Order placement, payment confirmation and delivery
//! - `payments` - Card processor client
//! - `reviews` - Product reviews and rating summaries
//!
//! Services borrow the stores they need from [`crate::state::AppState`] and
//! are built per request.

pub mod auth;
pub mod orders;
pub mod payments;
pub mod reviews;
