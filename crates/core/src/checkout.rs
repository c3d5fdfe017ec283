//! Checkout Step Guard.
//!
//! Checkout is a short walk: shipping address, then payment method, then place
//! order. [`CheckoutSession`] holds what the shopper has submitted so far and
//! [`CheckoutSession::ready_to_place`] is the gate in front of order placement.
//!
//! The guard sends shoppers back to the first missing step instead of failing.
//! It is a convenience for the shopper, not a security boundary: order creation
//! validates address and payment method again on its own.

use serde::{Deserialize, Serialize};

use crate::types::OrderId;

/// Checkout errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckoutError {
    /// A shipping address field is blank.
    #[error("shipping address field `{0}` is required")]
    IncompleteAddress(&'static str),
    /// The payment method label is not one the store accepts.
    #[error("unsupported payment method: {0}")]
    UnsupportedPaymentMethod(String),
    /// A step was attempted before an earlier one was completed.
    #[error("checkout step missing: {0}")]
    StepMissing(MissingStep),
}

/// Payment methods offered at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    /// Card payment through the card processor.
    Stripe,
    /// `PayPal` wallet.
    PayPal,
}

impl PaymentMethod {
    /// The label shown to shoppers and stored on orders.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stripe => "Stripe",
            Self::PayPal => "PayPal",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = CheckoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Stripe" => Ok(Self::Stripe),
            "PayPal" => Ok(Self::PayPal),
            other => Err(CheckoutError::UnsupportedPaymentMethod(other.to_owned())),
        }
    }
}

/// Where an order ships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    /// Street address.
    pub address: String,
    /// City.
    pub city: String,
    /// Postal or ZIP code.
    pub postal_code: String,
    /// Country.
    pub country: String,
}

impl ShippingAddress {
    /// Check that every field has content.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::IncompleteAddress`] naming the first blank field.
    pub fn validate(&self) -> Result<(), CheckoutError> {
        let fields = [
            ("address", &self.address),
            ("city", &self.city),
            ("postalCode", &self.postal_code),
            ("country", &self.country),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(CheckoutError::IncompleteAddress(name));
            }
        }
        Ok(())
    }

    /// Copy with surrounding whitespace removed from every field.
    #[must_use]
    pub fn trimmed(&self) -> Self {
        Self {
            address: self.address.trim().to_owned(),
            city: self.city.trim().to_owned(),
            postal_code: self.postal_code.trim().to_owned(),
            country: self.country.trim().to_owned(),
        }
    }
}

/// Progress through checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CheckoutStep {
    /// Nothing submitted yet.
    NoAddress,
    /// Shipping address submitted.
    AddressOnly,
    /// Address and payment method submitted; the order can be placed.
    AddressAndPayment,
    /// An order was placed from this session.
    Ordered,
}

/// The first step a shopper still has to complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MissingStep {
    /// No shipping address yet.
    Shipping,
    /// No payment method yet.
    Payment,
}

impl MissingStep {
    /// Client route of the page that completes this step.
    #[must_use]
    pub const fn path(&self) -> &'static str {
        match self {
            Self::Shipping => "/shipping",
            Self::Payment => "/payment",
        }
    }
}

impl std::fmt::Display for MissingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shipping => write!(f, "shipping address"),
            Self::Payment => write!(f, "payment method"),
        }
    }
}

/// What the shopper has submitted during checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    /// Submitted shipping address.
    pub shipping_address: Option<ShippingAddress>,
    /// Selected payment method.
    pub payment_method: Option<PaymentMethod>,
    /// Order most recently placed from this session.
    pub last_order: Option<OrderId>,
}

impl CheckoutSession {
    /// Current step, derived from what has been submitted.
    #[must_use]
    pub const fn step(&self) -> CheckoutStep {
        match (
            &self.shipping_address,
            &self.payment_method,
            &self.last_order,
        ) {
            (None, _, _) => CheckoutStep::NoAddress,
            (Some(_), None, _) => CheckoutStep::AddressOnly,
            (Some(_), Some(_), None) => CheckoutStep::AddressAndPayment,
            (Some(_), Some(_), Some(_)) => CheckoutStep::Ordered,
        }
    }

    /// Record the shipping address.
    ///
    /// Resubmitting after an order starts a new checkout.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::IncompleteAddress`] if a field is blank.
    pub fn submit_address(&mut self, address: ShippingAddress) -> Result<(), CheckoutError> {
        let address = address.trimmed();
        address.validate()?;
        self.shipping_address = Some(address);
        self.last_order = None;
        Ok(())
    }

    /// Record the payment method. Requires a shipping address first.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::StepMissing`] with [`MissingStep::Shipping`]
    /// when no address has been submitted.
    pub fn select_payment_method(&mut self, method: PaymentMethod) -> Result<(), CheckoutError> {
        if self.shipping_address.is_none() {
            return Err(CheckoutError::StepMissing(MissingStep::Shipping));
        }
        self.payment_method = Some(method);
        self.last_order = None;
        Ok(())
    }

    /// Address and payment method, if both are present.
    ///
    /// # Errors
    ///
    /// Returns the first missing step, address before payment.
    pub fn ready_to_place(&self) -> Result<(&ShippingAddress, PaymentMethod), MissingStep> {
        let address = self
            .shipping_address
            .as_ref()
            .ok_or(MissingStep::Shipping)?;
        let method = self.payment_method.ok_or(MissingStep::Payment)?;
        Ok((address, method))
    }

    /// Note that an order was placed. Address and method stay for next time.
    pub fn mark_ordered(&mut self, order_id: OrderId) {
        self.last_order = Some(order_id);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            address: "12 Sector Road".to_owned(),
            city: "Chandigarh".to_owned(),
            postal_code: "160017".to_owned(),
            country: "India".to_owned(),
        }
    }

    #[test]
    fn walks_through_every_step() {
        let mut session = CheckoutSession::default();
        assert_eq!(session.step(), CheckoutStep::NoAddress);

        session.submit_address(address()).unwrap();
        assert_eq!(session.step(), CheckoutStep::AddressOnly);

        session.select_payment_method(PaymentMethod::Stripe).unwrap();
        assert_eq!(session.step(), CheckoutStep::AddressAndPayment);

        session.mark_ordered(OrderId::new(9));
        assert_eq!(session.step(), CheckoutStep::Ordered);
        assert!(session.ready_to_place().is_ok());
    }

    #[test]
    fn payment_before_address_points_back_to_shipping() {
        let mut session = CheckoutSession::default();
        assert_eq!(
            session.select_payment_method(PaymentMethod::PayPal),
            Err(CheckoutError::StepMissing(MissingStep::Shipping))
        );
        assert_eq!(session.step(), CheckoutStep::NoAddress);
    }

    #[test]
    fn guard_reports_address_before_payment() {
        let mut session = CheckoutSession::default();
        assert_eq!(session.ready_to_place().unwrap_err(), MissingStep::Shipping);

        session.submit_address(address()).unwrap();
        assert_eq!(session.ready_to_place().unwrap_err(), MissingStep::Payment);
        assert_eq!(MissingStep::Payment.path(), "/payment");
    }

    #[test]
    fn blank_address_fields_are_rejected() {
        let mut session = CheckoutSession::default();
        let mut incomplete = address();
        incomplete.postal_code = "   ".to_owned();

        assert_eq!(
            session.submit_address(incomplete),
            Err(CheckoutError::IncompleteAddress("postalCode"))
        );
        assert!(session.shipping_address.is_none());
    }

    #[test]
    fn resubmitting_after_an_order_reopens_checkout() {
        let mut session = CheckoutSession::default();
        session.submit_address(address()).unwrap();
        session.select_payment_method(PaymentMethod::Stripe).unwrap();
        session.mark_ordered(OrderId::new(1));

        session.submit_address(address()).unwrap();
        assert_eq!(session.step(), CheckoutStep::AddressAndPayment);
    }

    #[test]
    fn payment_method_labels_round_trip() {
        assert_eq!("Stripe".parse::<PaymentMethod>().unwrap(), PaymentMethod::Stripe);
        assert_eq!(PaymentMethod::PayPal.to_string(), "PayPal");
        assert!("Cash".parse::<PaymentMethod>().is_err());
        assert_eq!(
            serde_json::to_string(&PaymentMethod::PayPal).unwrap(),
            "\"PayPal\""
        );
    }
}
