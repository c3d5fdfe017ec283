//! In-process payment gateway for tests and local demos.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    IntentRequest, PaymentError, PaymentGateway, PaymentIntent, STATUS_SUCCEEDED,
    validate_intent_id,
};

const INITIAL_STATUS: &str = "requires_payment_method";

/// Gateway that keeps intents in memory.
///
/// Intents start as `requires_payment_method`; call [`Self::succeed`] to play
/// the part of the shopper's browser completing the card payment.
#[derive(Debug, Default)]
pub struct MockPaymentGateway {
    state: RwLock<MockState>,
}

#[derive(Debug, Default)]
struct MockState {
    intents: HashMap<String, PaymentIntent>,
    next_id: u32,
    calls: usize,
    fail_next: Option<String>,
}

impl MockPaymentGateway {
    /// Create an empty gateway.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an intent as captured. Returns `false` for unknown ids.
    pub async fn succeed(&self, intent_id: &str) -> bool {
        self.set_status(intent_id, STATUS_SUCCEEDED).await
    }

    /// Overwrite an intent's status. Returns `false` for unknown ids.
    pub async fn set_status(&self, intent_id: &str, status: &str) -> bool {
        let mut state = self.state.write().await;
        match state.intents.get_mut(intent_id) {
            Some(intent) => {
                status.clone_into(&mut intent.status);
                true
            }
            None => false,
        }
    }

    /// Overwrite an intent's amount, simulating a tampered or stale intent.
    pub async fn set_amount(&self, intent_id: &str, amount_minor: i64) -> bool {
        let mut state = self.state.write().await;
        match state.intents.get_mut(intent_id) {
            Some(intent) => {
                intent.amount_minor = amount_minor;
                true
            }
            None => false,
        }
    }

    /// Make the next call fail with a processor error.
    pub async fn fail_next(&self, message: impl Into<String>) {
        self.state.write().await.fail_next = Some(message.into());
    }

    /// Number of calls made so far.
    pub async fn calls(&self) -> usize {
        self.state.read().await.calls
    }

    /// Look up an intent without counting a call.
    pub async fn intent(&self, intent_id: &str) -> Option<PaymentIntent> {
        self.state.read().await.intents.get(intent_id).cloned()
    }
}

impl MockState {
    fn begin_call(&mut self) -> Result<(), PaymentError> {
        self.calls += 1;
        match self.fail_next.take() {
            Some(message) => Err(PaymentError::Api {
                status: 402,
                message,
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_intent(&self, request: IntentRequest) -> Result<PaymentIntent, PaymentError> {
        let mut state = self.state.write().await;
        state.begin_call()?;

        // Same order and amount reuse the open intent, like an idempotency key.
        if let Some(existing) = state.intents.values().find(|intent| {
            intent.order_id == Some(request.order_id)
                && intent.amount_minor == request.amount_minor
        }) {
            return Ok(existing.clone());
        }

        state.next_id += 1;
        let id = format!("pi_mock_{}", state.next_id);
        let intent = PaymentIntent {
            client_secret: Some(format!("{id}_secret_mock")),
            id: id.clone(),
            amount_minor: request.amount_minor,
            currency: "inr".to_owned(),
            status: INITIAL_STATUS.to_owned(),
            order_id: Some(request.order_id),
        };
        state.intents.insert(id, intent.clone());
        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError> {
        validate_intent_id(intent_id)?;
        let mut state = self.state.write().await;
        state.begin_call()?;

        state
            .intents
            .get(intent_id)
            .cloned()
            .ok_or_else(|| PaymentError::Api {
                status: 404,
                message: format!("No such payment_intent: '{intent_id}'"),
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use marigold_core::OrderId;

    use super::*;

    fn request(order: i32, amount_minor: i64) -> IntentRequest {
        IntentRequest {
            order_id: OrderId::new(order),
            amount_minor,
        }
    }

    #[tokio::test]
    async fn intents_start_unpaid_and_can_be_completed() {
        let gateway = MockPaymentGateway::new();
        let intent = gateway.create_intent(request(1, 23_000)).await.unwrap();
        assert_eq!(intent.id, "pi_mock_1");
        assert!(!intent.is_succeeded());

        assert!(gateway.succeed(&intent.id).await);
        let fetched = gateway.retrieve_intent(&intent.id).await.unwrap();
        assert!(fetched.is_succeeded());
        assert_eq!(gateway.calls().await, 2);
    }

    #[tokio::test]
    async fn same_order_and_amount_reuse_the_intent() {
        let gateway = MockPaymentGateway::new();
        let first = gateway.create_intent(request(1, 500)).await.unwrap();
        let again = gateway.create_intent(request(1, 500)).await.unwrap();
        let other = gateway.create_intent(request(2, 500)).await.unwrap();

        assert_eq!(first.id, again.id);
        assert_ne!(first.id, other.id);
    }

    #[tokio::test]
    async fn fail_next_affects_one_call() {
        let gateway = MockPaymentGateway::new();
        gateway.fail_next("card declined").await;

        let err = gateway.create_intent(request(1, 500)).await.unwrap_err();
        assert!(matches!(err, PaymentError::Api { status: 402, .. }));
        assert!(gateway.create_intent(request(1, 500)).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_intent_is_an_api_error() {
        let gateway = MockPaymentGateway::new();
        let err = gateway.retrieve_intent("pi_nope").await.unwrap_err();
        assert!(matches!(err, PaymentError::Api { status: 404, .. }));
    }
}
