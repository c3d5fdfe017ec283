//! Core value types for Marigold.
//!
//! Type-safe wrappers for ids, email addresses, money amounts and order status.

pub mod email;
pub mod id;
pub mod money;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{Money, MoneyError};
pub use status::{OrderStatus, Transition};
