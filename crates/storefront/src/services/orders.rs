//! Order placement and the pay/deliver pipeline.

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use marigold_core::{
    Money, Order, OrderId, OrderOwner, OrderRequest, OrderValidationError, OrderWithOwner,
    PaymentReceipt, UserId,
};

use crate::db::{OrderStore, RepositoryError, UserStore};
use crate::models::{CurrentUser, User};
use crate::services::payments::{IntentRequest, PaymentError, PaymentGateway, PaymentIntent};

/// Errors from order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The order request is malformed.
    #[error(transparent)]
    Invalid(#[from] OrderValidationError),

    /// No such order.
    #[error("Order not found")]
    NotFound,

    /// The caller neither owns the order nor is an admin.
    #[error("Not authorized to view this order")]
    Forbidden,

    /// The order is already paid.
    #[error("Order is already paid")]
    AlreadyPaid,

    /// Delivery requested before payment.
    #[error("Order must be paid before it can be delivered")]
    NotPaid,

    /// The order total is zero, so there is nothing to charge.
    #[error("Order total must be greater than zero")]
    NothingToPay,

    /// The processor has not captured the payment.
    #[error("Payment not completed (status {0})")]
    PaymentIncomplete(String),

    /// The processor's intent does not belong to this order.
    #[error("Payment does not match this order: {0}")]
    PaymentMismatch(String),

    /// Talking to the processor failed.
    #[error("payment processor error: {0}")]
    Payment(#[from] PaymentError),

    /// Storage failure.
    #[error("repository error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for OrderError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound,
            RepositoryError::InvalidState(_) => Self::NotPaid,
            other => Self::Repository(other),
        }
    }
}

/// What the browser needs to collect a card payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentHandle {
    /// Secret for the processor's client library.
    pub client_secret: String,
    /// Processor intent id, echoed back when confirming.
    pub payment_intent_id: String,
    /// Amount charged, in minor units.
    pub amount: i64,
}

/// Order service.
pub struct OrderService<'a> {
    orders: &'a dyn OrderStore,
    users: &'a dyn UserStore,
    payments: &'a dyn PaymentGateway,
}

impl<'a> OrderService<'a> {
    /// Create a new order service.
    #[must_use]
    pub const fn new(
        orders: &'a dyn OrderStore,
        users: &'a dyn UserStore,
        payments: &'a dyn PaymentGateway,
    ) -> Self {
        Self {
            orders,
            users,
            payments,
        }
    }

    /// Validate and persist a new order.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Invalid` if the request fails validation; nothing is
    /// stored in that case.
    #[tracing::instrument(skip(self, request), fields(owner = %request.owner))]
    pub async fn place(&self, request: OrderRequest) -> Result<OrderWithOwner, OrderError> {
        let new_order = request.validate()?;
        let order = self.orders.create(new_order).await?;

        tracing::info!(
            order_id = %order.id,
            total = %order.totals.total_price,
            lines = order.lines.len(),
            "Order placed"
        );
        self.with_owner(order).await
    }

    /// Fetch an order the caller may see.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` or `OrderError::Forbidden`.
    pub async fn get(&self, caller: &CurrentUser, id: OrderId) -> Result<OrderWithOwner, OrderError> {
        let order = self.visible_order(caller, id).await?;
        self.with_owner(order).await
    }

    /// Every order, newest first. Callers must check admin rights.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` on storage failure.
    pub async fn list_all(&self) -> Result<Vec<OrderWithOwner>, OrderError> {
        let orders = self.orders.list_all().await?;
        self.with_owners(orders).await
    }

    /// The caller's own orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` on storage failure.
    pub async fn list_mine(&self, caller: &CurrentUser) -> Result<Vec<OrderWithOwner>, OrderError> {
        let orders = self.orders.list_for_owner(caller.id).await?;
        self.with_owners(orders).await
    }

    /// Open a card payment for an unpaid order.
    ///
    /// The charged amount always comes from the stored order. A client-supplied
    /// total is only compared and logged.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::AlreadyPaid` for paid orders,
    /// `OrderError::NothingToPay` for zero totals and `OrderError::Payment` if
    /// the processor fails.
    #[tracing::instrument(skip(self, caller, client_total), fields(user_id = %caller.id))]
    pub async fn create_payment_intent(
        &self,
        caller: &CurrentUser,
        id: OrderId,
        client_total: Option<Money>,
    ) -> Result<IntentHandle, OrderError> {
        let order = self.visible_order(caller, id).await?;
        if order.is_paid {
            return Err(OrderError::AlreadyPaid);
        }

        let total = order.totals.total_price;
        if let Some(claimed) = client_total
            && claimed != total
        {
            tracing::warn!(
                order_id = %id,
                claimed = %claimed,
                stored = %total,
                "Client total disagrees with stored order; charging stored total"
            );
        }

        let amount = minor_units(&order)?;
        if amount <= 0 {
            return Err(OrderError::NothingToPay);
        }

        let intent = self
            .payments
            .create_intent(IntentRequest {
                order_id: id,
                amount_minor: amount,
            })
            .await?;

        let client_secret = intent.client_secret.ok_or_else(|| {
            PaymentError::Parse(format!("intent {} has no client secret", intent.id))
        })?;

        tracing::info!(order_id = %id, intent_id = %intent.id, amount, "Payment intent opened");
        Ok(IntentHandle {
            client_secret,
            payment_intent_id: intent.id,
            amount,
        })
    }

    /// Record payment after checking the intent with the processor.
    ///
    /// Confirming an already-paid order returns it unchanged without contacting
    /// the processor. Concurrent confirmations record one payment.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::PaymentIncomplete` if the processor has not captured
    /// the payment, `OrderError::PaymentMismatch` if the intent is for another
    /// order or amount, and `OrderError::Payment` if the processor fails. The
    /// order is unchanged in every error case.
    #[tracing::instrument(skip(self, caller, receipt), fields(user_id = %caller.id))]
    pub async fn confirm_payment(
        &self,
        caller: &CurrentUser,
        id: OrderId,
        receipt: PaymentReceipt,
    ) -> Result<OrderWithOwner, OrderError> {
        let order = self.visible_order(caller, id).await?;
        if order.is_paid {
            tracing::debug!(order_id = %id, "Order already paid; nothing to record");
            return self.with_owner(order).await;
        }

        let intent = self.payments.retrieve_intent(&receipt.external_id).await?;
        verify_intent(&order, &intent)?;

        let recorded = PaymentReceipt {
            external_id: intent.id,
            status: intent.status,
            completed_at: receipt.completed_at,
            receipt_email: receipt.receipt_email,
        };
        let transition = self.orders.mark_paid(id, recorded, Utc::now()).await?;

        if transition.was_applied() {
            tracing::info!(order_id = %id, "Order paid");
        } else {
            tracing::info!(order_id = %id, "Order was paid by a concurrent confirmation");
        }
        self.with_owner(transition.into_inner()).await
    }

    /// Record delivery of a paid order. Callers must check admin rights.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotPaid` for unpaid orders and
    /// `OrderError::NotFound` for unknown ids.
    #[tracing::instrument(skip(self))]
    pub async fn mark_delivered(&self, id: OrderId) -> Result<OrderWithOwner, OrderError> {
        let transition = self.orders.mark_delivered(id, Utc::now()).await?;
        if transition.was_applied() {
            tracing::info!(order_id = %id, "Order delivered");
        }
        self.with_owner(transition.into_inner()).await
    }

    async fn visible_order(&self, caller: &CurrentUser, id: OrderId) -> Result<Order, OrderError> {
        let order = self.orders.get(id).await?.ok_or(OrderError::NotFound)?;
        if order.owner != caller.id && !caller.is_admin {
            return Err(OrderError::Forbidden);
        }
        Ok(order)
    }

    async fn with_owner(&self, order: Order) -> Result<OrderWithOwner, OrderError> {
        let user = self
            .users
            .get_user(order.owner)
            .await?
            .ok_or_else(|| missing_owner(&order))?;
        Ok(OrderWithOwner {
            order,
            user: owner_of(&user),
        })
    }

    async fn with_owners(&self, orders: Vec<Order>) -> Result<Vec<OrderWithOwner>, OrderError> {
        let mut ids: Vec<UserId> = orders.iter().map(|order| order.owner).collect();
        ids.sort_unstable_by_key(|id| id.as_i32());
        ids.dedup();

        let owners: HashMap<UserId, OrderOwner> = self
            .users
            .get_users(&ids)
            .await?
            .iter()
            .map(|user| (user.id, owner_of(user)))
            .collect();

        orders
            .into_iter()
            .map(|order| {
                let user = owners
                    .get(&order.owner)
                    .cloned()
                    .ok_or_else(|| missing_owner(&order))?;
                Ok(OrderWithOwner { order, user })
            })
            .collect()
    }
}

fn owner_of(user: &User) -> OrderOwner {
    OrderOwner {
        id: user.id,
        name: user.name.clone(),
        email: user.email.clone(),
    }
}

fn missing_owner(order: &Order) -> OrderError {
    OrderError::Repository(RepositoryError::DataCorruption(format!(
        "order {} references missing user {}",
        order.id, order.owner
    )))
}

fn minor_units(order: &Order) -> Result<i64, OrderError> {
    order.totals.total_price.to_minor_units().map_err(|e| {
        OrderError::Repository(RepositoryError::DataCorruption(format!(
            "order {}: {e}",
            order.id
        )))
    })
}

fn verify_intent(order: &Order, intent: &PaymentIntent) -> Result<(), OrderError> {
    if !intent.is_succeeded() {
        return Err(OrderError::PaymentIncomplete(intent.status.clone()));
    }
    if intent.order_id != Some(order.id) {
        return Err(OrderError::PaymentMismatch(format!(
            "intent {} was opened for another order",
            intent.id
        )));
    }
    let expected = minor_units(order)?;
    if intent.amount_minor != expected {
        return Err(OrderError::PaymentMismatch(format!(
            "intent {} charged {} but the order total is {expected}",
            intent.id, intent.amount_minor
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use marigold_core::{Email, OrderLine, OrderTotals, PaymentMethod, ShippingAddress};

    use super::*;
    use crate::db::{CatalogStore, MemoryStore};
    use crate::models::{NewProduct, NewUser};
    use crate::services::payments::MockPaymentGateway;

    struct Fixture {
        store: MemoryStore,
        gateway: MockPaymentGateway,
        shopper: CurrentUser,
        admin: CurrentUser,
        stranger: CurrentUser,
    }

    impl Fixture {
        fn service(&self) -> OrderService<'_> {
            OrderService::new(&self.store, &self.store, &self.gateway)
        }
    }

    async fn user(store: &MemoryStore, name: &str, is_admin: bool) -> CurrentUser {
        let user = store
            .create_user(NewUser {
                name: name.to_owned(),
                email: Email::parse(&format!("{}@example.com", name.to_lowercase())).unwrap(),
                password_hash: "hash".to_owned(),
                is_admin,
            })
            .await
            .unwrap();
        CurrentUser::from(&user)
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let shopper = user(&store, "Asha", false).await;
        let admin = user(&store, "Admin", true).await;
        let stranger = user(&store, "Ravi", false).await;
        Fixture {
            store,
            gateway: MockPaymentGateway::new(),
            shopper,
            admin,
            stranger,
        }
    }

    async fn request(fx: &Fixture) -> OrderRequest {
        let product = fx
            .store
            .create_product(NewProduct {
                price: Money::from_major(100),
                count_in_stock: 5,
                ..NewProduct::sample(fx.admin.id)
            })
            .await
            .unwrap();
        OrderRequest {
            owner: fx.shopper.id,
            lines: vec![OrderLine {
                product_id: product.id,
                name: product.name,
                image: product.image,
                unit_price: product.price,
                quantity: 2,
            }],
            shipping_address: Some(ShippingAddress {
                address: "1 Main St".to_owned(),
                city: "Pune".to_owned(),
                postal_code: "411001".to_owned(),
                country: "India".to_owned(),
            }),
            payment_method: Some(PaymentMethod::Stripe),
            totals: OrderTotals {
                items_price: Money::from_major(200),
                shipping_price: Money::ZERO,
                tax_price: Money::from_major(30),
                total_price: Money::from_major(230),
            },
        }
    }

    fn receipt(intent_id: &str) -> PaymentReceipt {
        PaymentReceipt {
            external_id: intent_id.to_owned(),
            status: "succeeded".to_owned(),
            completed_at: "2026-05-01T10:00:00Z".to_owned(),
            receipt_email: Some("asha@example.com".to_owned()),
        }
    }

    #[tokio::test]
    async fn placed_order_carries_owner() {
        let fx = fixture().await;
        let placed = fx.service().place(request(&fx).await).await.unwrap();

        assert_eq!(placed.user.id, fx.shopper.id);
        assert_eq!(placed.user.name, "Asha");
        assert!(!placed.order.is_paid);
    }

    #[tokio::test]
    async fn invalid_order_is_not_stored() {
        let fx = fixture().await;
        let mut bad = request(&fx).await;
        bad.shipping_address = None;

        let err = fx.service().place(bad).await.unwrap_err();
        assert!(matches!(
            err,
            OrderError::Invalid(OrderValidationError::MissingShippingAddress)
        ));
        assert!(fx.service().list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn only_owner_or_admin_can_read() {
        let fx = fixture().await;
        let id = fx.service().place(request(&fx).await).await.unwrap().order.id;

        assert!(fx.service().get(&fx.shopper, id).await.is_ok());
        assert!(fx.service().get(&fx.admin, id).await.is_ok());
        assert!(matches!(
            fx.service().get(&fx.stranger, id).await,
            Err(OrderError::Forbidden)
        ));
        assert!(matches!(
            fx.service().get(&fx.shopper, OrderId::new(999)).await,
            Err(OrderError::NotFound)
        ));
    }

    #[tokio::test]
    async fn intent_amount_comes_from_stored_order() {
        let fx = fixture().await;
        let id = fx.service().place(request(&fx).await).await.unwrap().order.id;

        let handle = fx
            .service()
            .create_payment_intent(&fx.shopper, id, Some(Money::from_major(1)))
            .await
            .unwrap();
        assert_eq!(handle.amount, 23_000);
        assert!(!handle.client_secret.is_empty());
    }

    #[tokio::test]
    async fn confirm_requires_captured_matching_intent() {
        let fx = fixture().await;
        let id = fx.service().place(request(&fx).await).await.unwrap().order.id;
        let handle = fx
            .service()
            .create_payment_intent(&fx.shopper, id, None)
            .await
            .unwrap();

        let err = fx
            .service()
            .confirm_payment(&fx.shopper, id, receipt(&handle.payment_intent_id))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::PaymentIncomplete(_)));

        fx.gateway.succeed(&handle.payment_intent_id).await;
        fx.gateway.set_amount(&handle.payment_intent_id, 100).await;
        let err = fx
            .service()
            .confirm_payment(&fx.shopper, id, receipt(&handle.payment_intent_id))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::PaymentMismatch(_)));

        let order = fx.service().get(&fx.shopper, id).await.unwrap().order;
        assert!(!order.is_paid);
    }

    #[tokio::test]
    async fn second_confirmation_keeps_first_payment() {
        let fx = fixture().await;
        let id = fx.service().place(request(&fx).await).await.unwrap().order.id;
        let handle = fx
            .service()
            .create_payment_intent(&fx.shopper, id, None)
            .await
            .unwrap();
        fx.gateway.succeed(&handle.payment_intent_id).await;

        let first = fx
            .service()
            .confirm_payment(&fx.shopper, id, receipt(&handle.payment_intent_id))
            .await
            .unwrap()
            .order;
        let calls = fx.gateway.calls().await;

        let second = fx
            .service()
            .confirm_payment(&fx.shopper, id, receipt("pi_other"))
            .await
            .unwrap()
            .order;

        assert_eq!(first.paid_at, second.paid_at);
        assert_eq!(first.payment_result, second.payment_result);
        assert_eq!(fx.gateway.calls().await, calls);
        assert!(matches!(
            fx.service()
                .create_payment_intent(&fx.shopper, id, None)
                .await,
            Err(OrderError::AlreadyPaid)
        ));
    }

    #[tokio::test]
    async fn concurrent_confirmations_record_one_payment() {
        let fx = Arc::new(fixture().await);
        let id = fx.service().place(request(&fx).await).await.unwrap().order.id;
        let handle = fx
            .service()
            .create_payment_intent(&fx.shopper, id, None)
            .await
            .unwrap();
        fx.gateway.succeed(&handle.payment_intent_id).await;

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let fx = Arc::clone(&fx);
                let intent = handle.payment_intent_id.clone();
                tokio::spawn(async move {
                    fx.service()
                        .confirm_payment(&fx.shopper, id, receipt(&intent))
                        .await
                        .unwrap()
                        .order
                })
            })
            .collect();

        let mut paid_at = Vec::new();
        for task in tasks {
            paid_at.push(task.await.unwrap().paid_at);
        }
        paid_at.dedup();
        assert_eq!(paid_at.len(), 1);
    }

    #[tokio::test]
    async fn delivery_requires_payment() {
        let fx = fixture().await;
        let id = fx.service().place(request(&fx).await).await.unwrap().order.id;

        assert!(matches!(
            fx.service().mark_delivered(id).await,
            Err(OrderError::NotPaid)
        ));
        assert!(matches!(
            fx.service().mark_delivered(OrderId::new(404)).await,
            Err(OrderError::NotFound)
        ));
    }

    #[tokio::test]
    async fn processor_failure_leaves_order_unpaid() {
        let fx = fixture().await;
        let id = fx.service().place(request(&fx).await).await.unwrap().order.id;
        fx.gateway.fail_next("processor down").await;

        let err = fx
            .service()
            .confirm_payment(&fx.shopper, id, receipt("pi_mock_1"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Payment(_)));
        assert!(!fx.service().get(&fx.shopper, id).await.unwrap().order.is_paid);
    }

    #[tokio::test]
    async fn listings_scope_to_caller() {
        let fx = fixture().await;
        fx.service().place(request(&fx).await).await.unwrap();

        assert_eq!(fx.service().list_mine(&fx.shopper).await.unwrap().len(), 1);
        assert!(fx.service().list_mine(&fx.stranger).await.unwrap().is_empty());
        assert_eq!(fx.service().list_all().await.unwrap().len(), 1);
    }
}
