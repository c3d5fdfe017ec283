//! Order status and transition outcomes.

use serde::{Deserialize, Serialize};

/// Where an order sits in the pay-then-deliver pipeline.
///
/// Derived from the order's `is_paid` / `is_delivered` flags, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderStatus {
    /// Placed, no successful payment recorded yet.
    AwaitingPayment,
    /// Payment recorded, not yet handed to the shopper.
    Paid,
    /// Marked delivered by an administrator.
    Delivered,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AwaitingPayment => write!(f, "awaiting_payment"),
            Self::Paid => write!(f, "paid"),
            Self::Delivered => write!(f, "delivered"),
        }
    }
}

/// Result of an idempotent state change.
///
/// Both variants carry the record as it stands after the call, so a retried
/// request gets the same answer as the one that did the work.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition<T> {
    /// This call moved the record into the target state.
    Applied(T),
    /// The record was already in the target state; nothing changed.
    Unchanged(T),
}

impl<T> Transition<T> {
    /// Whether this call performed the change.
    #[must_use]
    pub const fn was_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    /// The record, regardless of which call changed it.
    #[must_use]
    pub fn into_inner(self) -> T {
        match self {
            Self::Applied(value) | Self::Unchanged(value) => value,
        }
    }

    /// Borrow the record.
    #[must_use]
    pub const fn get(&self) -> &T {
        match self {
            Self::Applied(value) | Self::Unchanged(value) => value,
        }
    }

    /// Map the carried record, keeping the variant.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Transition<U> {
        match self {
            Self::Applied(value) => Transition::Applied(f(value)),
            Self::Unchanged(value) => Transition::Unchanged(f(value)),
        }
    }
}
