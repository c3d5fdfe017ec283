//! Domain models for the storefront.
//!
//! Core order, cart and review types live in `marigold_core`; these are the
//! records only the server deals with: accounts, catalog entries and the values
//! kept in the shopper's session.

pub mod product;
pub mod session;
pub mod user;

pub use product::{NewProduct, Product, ProductDetail, ProductFilter, ProductPage, ProductUpdate};
pub use session::{CurrentUser, keys};
pub use user::{NewUser, User, UserCredentials, UserProfile, UserUpdate, WishlistToggle};
