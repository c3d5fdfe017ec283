//! Order records and their two transitions.
//!
//! An order is a snapshot: line items, address, payment method and totals are
//! copied in when the shopper places it and never recomputed. Afterwards only two
//! things can happen to it, each at most once:
//!
//! ```text
//!  placed ──apply_payment──▶ paid ──apply_delivery──▶ delivered
//! ```
//!
//! Both transitions are idempotent. Repeating one returns the order unchanged,
//! so a retried payment confirmation can never record a second payment.
//! Delivery requires payment first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cart::CartLine;
use crate::checkout::{PaymentMethod, ShippingAddress};
use crate::types::{Email, Money, OrderId, OrderStatus, ProductId, UserId};

/// A line item as snapshotted onto an order.
pub type OrderLine = CartLine;

/// Reasons an order cannot be created.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderValidationError {
    /// No line items.
    #[error("no order items")]
    EmptyOrder,
    /// A line has quantity zero.
    #[error("quantity for product {0} must be at least 1")]
    InvalidQuantity(ProductId),
    /// A line has a negative unit price.
    #[error("price for product {0} cannot be negative")]
    NegativePrice(ProductId),
    /// A line has a unit price above what the catalog can store.
    #[error("price for product {0} is too large")]
    PriceTooLarge(ProductId),
    /// No shipping address supplied.
    #[error("shipping address is required")]
    MissingShippingAddress,
    /// Shipping address supplied with a blank field.
    #[error("shipping address field `{0}` is required")]
    IncompleteAddress(&'static str),
    /// No payment method supplied.
    #[error("payment method is required")]
    MissingPaymentMethod,
    /// A total component is below zero.
    #[error("{0} cannot be negative")]
    NegativeAmount(&'static str),
    /// A total component has fractions of a cent.
    #[error("{0} must have at most two decimal places")]
    SubCentAmount(&'static str),
    /// A total component is above 9,999,999,999.99.
    #[error("{0} is too large")]
    AmountTooLarge(&'static str),
    /// `totalPrice` is not the sum of its parts.
    #[error("totalPrice {actual} does not equal itemsPrice + shippingPrice + taxPrice ({expected})")]
    TotalMismatch {
        /// Sum of the parts.
        expected: Money,
        /// Total as supplied.
        actual: Money,
    },
}

/// Transition rule violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// Delivery was attempted on an order with no recorded payment.
    #[error("order {0} must be paid before it can be delivered")]
    NotPaid(OrderId),
}

/// Price breakdown of a cart or order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotals {
    /// Sum of line totals.
    pub items_price: Money,
    /// Shipping charge.
    pub shipping_price: Money,
    /// Tax charge.
    pub tax_price: Money,
    /// What the shopper pays.
    pub total_price: Money,
}

impl OrderTotals {
    /// Check the parts are non-negative whole cents within the stored range and
    /// add up to the total.
    ///
    /// # Errors
    ///
    /// Returns the first [`OrderValidationError`] found.
    pub fn validate(&self) -> Result<(), OrderValidationError> {
        let parts = [
            ("itemsPrice", self.items_price),
            ("shippingPrice", self.shipping_price),
            ("taxPrice", self.tax_price),
            ("totalPrice", self.total_price),
        ];
        for (name, amount) in parts {
            if amount.is_negative() {
                return Err(OrderValidationError::NegativeAmount(name));
            }
            if amount.is_sub_cent() {
                return Err(OrderValidationError::SubCentAmount(name));
            }
            if amount.exceeds_stored_max() {
                return Err(OrderValidationError::AmountTooLarge(name));
            }
        }

        let expected = self
            .items_price
            .checked_add(self.shipping_price)
            .and_then(|sum| sum.checked_add(self.tax_price))
            .ok_or(OrderValidationError::AmountTooLarge("totalPrice"))?;
        if expected != self.total_price {
            return Err(OrderValidationError::TotalMismatch {
                expected,
                actual: self.total_price,
            });
        }
        Ok(())
    }
}

/// An order as submitted, before validation.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    /// Shopper placing the order.
    pub owner: UserId,
    /// Line items.
    pub lines: Vec<OrderLine>,
    /// Shipping address, if supplied.
    pub shipping_address: Option<ShippingAddress>,
    /// Payment method, if supplied.
    pub payment_method: Option<PaymentMethod>,
    /// Totals as computed by the caller.
    pub totals: OrderTotals,
}

impl OrderRequest {
    /// Validate into a [`NewOrder`] ready to persist.
    ///
    /// # Errors
    ///
    /// Returns the first [`OrderValidationError`] found.
    pub fn validate(self) -> Result<NewOrder, OrderValidationError> {
        if self.lines.is_empty() {
            return Err(OrderValidationError::EmptyOrder);
        }
        for line in &self.lines {
            if line.quantity == 0 {
                return Err(OrderValidationError::InvalidQuantity(line.product_id));
            }
            if line.unit_price.is_negative() {
                return Err(OrderValidationError::NegativePrice(line.product_id));
            }
            if line.unit_price.exceeds_stored_max() {
                return Err(OrderValidationError::PriceTooLarge(line.product_id));
            }
        }

        let shipping_address = self
            .shipping_address
            .ok_or(OrderValidationError::MissingShippingAddress)?
            .trimmed();
        shipping_address.validate().map_err(|e| match e {
            crate::CheckoutError::IncompleteAddress(field) => {
                OrderValidationError::IncompleteAddress(field)
            }
            _ => OrderValidationError::MissingShippingAddress,
        })?;

        let payment_method = self
            .payment_method
            .ok_or(OrderValidationError::MissingPaymentMethod)?;

        self.totals.validate()?;

        Ok(NewOrder {
            owner: self.owner,
            lines: self.lines,
            shipping_address,
            payment_method,
            totals: self.totals,
        })
    }
}

/// A validated order ready to be stored.
///
/// Only obtainable through [`OrderRequest::validate`].
#[derive(Debug, Clone)]
pub struct NewOrder {
    owner: UserId,
    lines: Vec<OrderLine>,
    shipping_address: ShippingAddress,
    payment_method: PaymentMethod,
    totals: OrderTotals,
}

impl NewOrder {
    /// Shopper placing the order.
    #[must_use]
    pub const fn owner(&self) -> UserId {
        self.owner
    }

    /// Line items.
    #[must_use]
    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    /// Shipping address.
    #[must_use]
    pub const fn shipping_address(&self) -> &ShippingAddress {
        &self.shipping_address
    }

    /// Payment method.
    #[must_use]
    pub const fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    /// Snapshotted totals.
    #[must_use]
    pub const fn totals(&self) -> OrderTotals {
        self.totals
    }

    /// Materialize as a stored order with the given id and creation time.
    #[must_use]
    pub fn into_order(self, id: OrderId, created_at: DateTime<Utc>) -> Order {
        Order {
            id,
            owner: self.owner,
            lines: self.lines,
            shipping_address: self.shipping_address,
            payment_method: self.payment_method,
            totals: self.totals,
            is_paid: false,
            paid_at: None,
            payment_result: None,
            is_delivered: false,
            delivered_at: None,
            created_at,
        }
    }
}

/// Processor receipt recorded when an order is paid.
///
/// Field names on the wire follow the payment confirmation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    /// Processor's payment id.
    #[serde(rename = "id")]
    pub external_id: String,
    /// Processor's status for the payment.
    pub status: String,
    /// When the processor completed the payment, as reported.
    #[serde(rename = "update_time")]
    pub completed_at: String,
    /// Where the processor sent the receipt.
    #[serde(rename = "email_address")]
    pub receipt_email: Option<String>,
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Order id.
    pub id: OrderId,
    /// Shopper who placed the order. Serialized through [`OrderWithOwner`].
    #[serde(skip_serializing)]
    pub owner: UserId,
    /// Line item snapshot.
    #[serde(rename = "orderItems")]
    pub lines: Vec<OrderLine>,
    /// Shipping address snapshot.
    pub shipping_address: ShippingAddress,
    /// Payment method label.
    pub payment_method: PaymentMethod,
    /// Totals snapshot.
    #[serde(flatten)]
    pub totals: OrderTotals,
    /// Payment recorded.
    pub is_paid: bool,
    /// When payment was recorded.
    pub paid_at: Option<DateTime<Utc>>,
    /// Processor receipt.
    pub payment_result: Option<PaymentReceipt>,
    /// Delivered to the shopper.
    pub is_delivered: bool,
    /// When delivery was recorded.
    pub delivered_at: Option<DateTime<Utc>>,
    /// When the order was placed.
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Pipeline position derived from the flags.
    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        if self.is_delivered {
            OrderStatus::Delivered
        } else if self.is_paid {
            OrderStatus::Paid
        } else {
            OrderStatus::AwaitingPayment
        }
    }

    /// Record payment. Returns `false` (and changes nothing) if already paid.
    pub fn apply_payment(&mut self, receipt: PaymentReceipt, at: DateTime<Utc>) -> bool {
        if self.is_paid {
            return false;
        }
        self.is_paid = true;
        self.paid_at = Some(at);
        self.payment_result = Some(receipt);
        true
    }

    /// Record delivery. Returns `Ok(false)` if already delivered.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::NotPaid`] if the order has not been paid.
    pub fn apply_delivery(&mut self, at: DateTime<Utc>) -> Result<bool, TransitionError> {
        if !self.is_paid {
            return Err(TransitionError::NotPaid(self.id));
        }
        if self.is_delivered {
            return Ok(false);
        }
        self.is_delivered = true;
        self.delivered_at = Some(at);
        Ok(true)
    }

    /// Whether the flag/timestamp pairs and total are consistent.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.is_paid == self.paid_at.is_some()
            && self.is_paid == self.payment_result.is_some()
            && self.is_delivered == self.delivered_at.is_some()
            && (!self.is_delivered || self.is_paid)
            && self.totals.validate().is_ok()
    }
}

/// Display data for the shopper who owns an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderOwner {
    /// User id.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: Email,
}

/// An order with its owner resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderWithOwner {
    /// The order.
    #[serde(flatten)]
    pub order: Order,
    /// Its owner.
    pub user: OrderOwner,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn address() -> ShippingAddress {
        ShippingAddress {
            address: "221B Baker Street".to_owned(),
            city: "London".to_owned(),
            postal_code: "NW1 6XE".to_owned(),
            country: "UK".to_owned(),
        }
    }

    fn request() -> OrderRequest {
        OrderRequest {
            owner: UserId::new(1),
            lines: vec![OrderLine {
                product_id: ProductId::new(10),
                name: "Headphones".to_owned(),
                image: "/images/headphones.jpg".to_owned(),
                unit_price: money("100"),
                quantity: 2,
            }],
            shipping_address: Some(address()),
            payment_method: Some(PaymentMethod::Stripe),
            totals: OrderTotals {
                items_price: money("200"),
                shipping_price: Money::ZERO,
                tax_price: money("30.00"),
                total_price: money("230.00"),
            },
        }
    }

    fn receipt(id: &str) -> PaymentReceipt {
        PaymentReceipt {
            external_id: id.to_owned(),
            status: "succeeded".to_owned(),
            completed_at: "1717000000".to_owned(),
            receipt_email: Some("buyer@example.com".to_owned()),
        }
    }

    #[test]
    fn valid_request_keeps_caller_totals() {
        let new_order = request().validate().unwrap();
        assert_eq!(new_order.totals().total_price, money("230.00"));

        let order = new_order.into_order(OrderId::new(1), Utc::now());
        assert_eq!(order.status(), OrderStatus::AwaitingPayment);
        assert!(order.is_consistent());
    }

    #[test]
    fn empty_order_is_rejected() {
        let mut req = request();
        req.lines.clear();
        assert_eq!(req.validate().unwrap_err(), OrderValidationError::EmptyOrder);
    }

    #[test]
    fn missing_address_or_payment_is_rejected() {
        let mut req = request();
        req.shipping_address = None;
        assert_eq!(
            req.validate().unwrap_err(),
            OrderValidationError::MissingShippingAddress
        );

        let mut req = request();
        req.payment_method = None;
        assert_eq!(
            req.validate().unwrap_err(),
            OrderValidationError::MissingPaymentMethod
        );

        let mut req = request();
        req.shipping_address = Some(ShippingAddress {
            city: String::new(),
            ..address()
        });
        assert_eq!(
            req.validate().unwrap_err(),
            OrderValidationError::IncompleteAddress("city")
        );
    }

    #[test]
    fn amounts_beyond_stored_range_are_rejected() {
        let mut req = request();
        req.totals.items_price = money("1000000000000000000000000000");
        req.totals.total_price = money("1000000000000000000000000000");
        assert_eq!(
            req.validate().unwrap_err(),
            OrderValidationError::AmountTooLarge("itemsPrice")
        );

        // Would overflow the decimal if summed unchecked.
        let mut req = request();
        req.totals.items_price = money("70000000000000000000000000000");
        req.totals.shipping_price = money("70000000000000000000000000000");
        assert_eq!(
            req.validate().unwrap_err(),
            OrderValidationError::AmountTooLarge("itemsPrice")
        );

        let mut req = request();
        req.totals.items_price = money("10000000000");
        req.totals.tax_price = Money::ZERO;
        req.totals.total_price = money("10000000000");
        assert_eq!(
            req.validate().unwrap_err(),
            OrderValidationError::AmountTooLarge("itemsPrice")
        );

        let mut req = request();
        req.lines.first_mut().unwrap().unit_price = money("10000000000");
        assert_eq!(
            req.validate().unwrap_err(),
            OrderValidationError::PriceTooLarge(ProductId::new(10))
        );
    }

    #[test]
    fn largest_storable_total_is_accepted() {
        let mut req = request();
        req.totals = OrderTotals {
            items_price: money("9999999899.99"),
            shipping_price: Money::ZERO,
            tax_price: money("100.00"),
            total_price: Money::MAX_STORED,
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn inconsistent_totals_are_rejected() {
        let mut req = request();
        req.totals.total_price = money("199.00");
        assert!(matches!(
            req.validate().unwrap_err(),
            OrderValidationError::TotalMismatch { .. }
        ));

        let mut req = request();
        req.totals.tax_price = money("30.001");
        req.totals.total_price = money("230.001");
        assert_eq!(
            req.validate().unwrap_err(),
            OrderValidationError::SubCentAmount("taxPrice")
        );
    }

    #[test]
    fn payment_is_recorded_once() {
        let mut order = request().validate().unwrap().into_order(OrderId::new(3), Utc::now());
        let first = Utc::now();

        assert!(order.apply_payment(receipt("pi_1"), first));
        assert!(!order.apply_payment(receipt("pi_2"), first + Duration::seconds(5)));

        assert_eq!(order.paid_at, Some(first));
        assert_eq!(order.payment_result.as_ref().unwrap().external_id, "pi_1");
        assert_eq!(order.status(), OrderStatus::Paid);
        assert!(order.is_consistent());
    }

    #[test]
    fn delivery_requires_payment_and_is_idempotent() {
        let mut order = request().validate().unwrap().into_order(OrderId::new(4), Utc::now());
        assert_eq!(
            order.apply_delivery(Utc::now()),
            Err(TransitionError::NotPaid(OrderId::new(4)))
        );
        assert!(!order.is_delivered);

        order.apply_payment(receipt("pi_1"), Utc::now());
        let delivered = Utc::now();
        assert_eq!(order.apply_delivery(delivered), Ok(true));
        assert_eq!(order.apply_delivery(delivered + Duration::hours(1)), Ok(false));
        assert_eq!(order.delivered_at, Some(delivered));
        assert_eq!(order.status(), OrderStatus::Delivered);
        assert!(order.is_consistent());
    }

    #[test]
    fn order_json_uses_storefront_field_names() {
        let order = request().validate().unwrap().into_order(OrderId::new(5), Utc::now());
        let json = serde_json::to_value(OrderWithOwner {
            order,
            user: OrderOwner {
                id: UserId::new(1),
                name: "Asha".to_owned(),
                email: Email::parse("asha@example.com").unwrap(),
            },
        })
        .unwrap();

        assert_eq!(json["id"], 5);
        assert_eq!(json["user"]["name"], "Asha");
        assert_eq!(json["orderItems"][0]["qty"], 2);
        assert_eq!(json["orderItems"][0]["product"], 10);
        assert_eq!(json["shippingAddress"]["postalCode"], "NW1 6XE");
        assert_eq!(json["paymentMethod"], "Stripe");
        assert_eq!(json["totalPrice"], 230.0);
        assert_eq!(json["isPaid"], false);
        assert!(json["paidAt"].is_null());
    }
}
