//! Card processor bridge.
//!
//! [`PaymentGateway`] is the seam between order logic and the processor. The
//! server uses [`StripeGateway`]; tests use [`MockPaymentGateway`].

mod mock;
mod stripe;

pub use mock::MockPaymentGateway;
pub use stripe::StripeGateway;

use async_trait::async_trait;
use thiserror::Error;

use marigold_core::OrderId;

/// Processor status of a successfully captured payment.
pub const STATUS_SUCCEEDED: &str = "succeeded";

/// Errors talking to the processor.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The processor did not answer in time.
    #[error("payment processor timed out")]
    Timeout,

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The intent id is not one the processor could have issued.
    #[error("invalid payment intent id: {0}")]
    InvalidIntentId(String),
}

impl PaymentError {
    /// Message safe to show to the shopper.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Api { message, .. } => message.clone(),
            Self::Timeout => "Payment processor did not respond in time".to_owned(),
            Self::InvalidIntentId(_) => "Unknown payment".to_owned(),
            Self::Http(_) | Self::Parse(_) => "Payment processor unavailable".to_owned(),
        }
    }
}

/// Request to open a payment intent for an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentRequest {
    /// Order being paid. Recorded in the intent's metadata.
    pub order_id: OrderId,
    /// Amount in minor units (paise, cents).
    pub amount_minor: i64,
}

/// A payment intent as reported by the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    /// Processor intent id.
    pub id: String,
    /// Secret the browser uses to confirm the card payment.
    pub client_secret: Option<String>,
    /// Amount in minor units.
    pub amount_minor: i64,
    /// Lowercase ISO currency code.
    pub currency: String,
    /// Processor status, e.g. `requires_payment_method` or `succeeded`.
    pub status: String,
    /// Order id recorded in the intent's metadata, if any.
    pub order_id: Option<OrderId>,
}

impl PaymentIntent {
    /// Whether the processor captured the payment.
    #[must_use]
    pub fn is_succeeded(&self) -> bool {
        self.status == STATUS_SUCCEEDED
    }
}

/// Card processor operations the checkout needs.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open (or reuse) a payment intent for an order.
    async fn create_intent(&self, request: IntentRequest) -> Result<PaymentIntent, PaymentError>;

    /// Fetch an intent's current state from the processor.
    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError>;
}

/// Processor-issued ids are short ASCII tokens like `pi_3N...`.
fn validate_intent_id(id: &str) -> Result<(), PaymentError> {
    let valid = !id.is_empty()
        && id.len() <= 255
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(PaymentError::InvalidIntentId(id.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_ids_are_validated() {
        assert!(validate_intent_id("pi_3N4abcDEF").is_ok());
        assert!(validate_intent_id("").is_err());
        assert!(validate_intent_id("pi_1/../../v1/charges").is_err());
        assert!(validate_intent_id("pi 1").is_err());
    }

    #[test]
    fn public_message_hides_transport_details() {
        let err = PaymentError::Parse("unexpected token at line 1".to_owned());
        assert_eq!(err.public_message(), "Payment processor unavailable");

        let err = PaymentError::Api {
            status: 402,
            message: "Your card was declined.".to_owned(),
        };
        assert_eq!(err.public_message(), "Your card was declined.");
    }
}
