//! Cart Aggregator.
//!
//! A cart is the shopper's set of `(product, quantity)` selections plus the
//! totals derived from them. It holds no connection to anything: the storefront
//! keeps a `Cart` in the shopper's session and writes it back after every change.
//!
//! Totals are recomputed on every read from the current lines:
//!
//! ```text
//! items_price    = Σ price × qty
//! shipping_price = 0 if items_price > threshold, else the flat fee
//! tax_price      = round(tax_rate × items_price, 2)
//! total_price    = round(items_price + shipping_price + tax_price, 2)
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::order::OrderTotals;
use crate::types::{Money, ProductId};

/// Totals derived from a cart. Same shape as the totals snapshotted on an order.
pub type CartTotals = OrderTotals;

/// Cart mutation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CartError {
    /// Quantities start at one; use [`Cart::remove`] to drop a line.
    #[error("quantity must be at least 1")]
    InvalidQuantity,
    /// A line's unit price is below zero.
    #[error("price cannot be negative")]
    NegativePrice,
}

/// Shipping and tax constants used to derive cart totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingConfig {
    /// Carts whose items total strictly more than this ship free.
    pub free_shipping_threshold: Money,
    /// Shipping charged at or below the threshold.
    pub flat_shipping_fee: Money,
    /// Fraction of the items total charged as tax (0.15 = 15%).
    pub tax_rate: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            free_shipping_threshold: Money::from_major(100),
            flat_shipping_fee: Money::from_major(10),
            tax_rate: Decimal::new(15, 2),
        }
    }
}

/// One product selection with its unit price captured when it was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Product this line refers to. Unique within a cart.
    #[serde(rename = "product")]
    pub product_id: ProductId,
    /// Product name at add time.
    pub name: String,
    /// Product image URL at add time.
    pub image: String,
    /// Unit price snapshot.
    #[serde(rename = "price")]
    pub unit_price: Money,
    /// Quantity, at least one.
    #[serde(rename = "qty")]
    pub quantity: u32,
}

impl CartLine {
    /// `unit_price × quantity`.
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.unit_price * self.quantity
    }
}

/// The shopper's cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    /// An empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Current lines in insertion order.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Take the lines out, leaving the cart untouched.
    #[must_use]
    pub fn snapshot(&self) -> Vec<CartLine> {
        self.lines.clone()
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|line| line.quantity).sum()
    }

    /// Add a line, or replace the existing line for the same product.
    ///
    /// Replacing does not add quantities: the new line wins outright.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidQuantity`] for a zero quantity and
    /// [`CartError::NegativePrice`] for a negative unit price.
    pub fn add_or_update(&mut self, line: CartLine) -> Result<(), CartError> {
        if line.quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }
        if line.unit_price.is_negative() {
            return Err(CartError::NegativePrice);
        }

        match self
            .lines
            .iter_mut()
            .find(|existing| existing.product_id == line.product_id)
        {
            Some(existing) => *existing = line,
            None => self.lines.push(line),
        }
        Ok(())
    }

    /// Remove the line for `product_id`. Returns whether a line was removed.
    pub fn remove(&mut self, product_id: ProductId) -> bool {
        let before = self.lines.len();
        self.lines.retain(|line| line.product_id != product_id);
        self.lines.len() != before
    }

    /// Drop every line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Derive totals from the current lines.
    #[must_use]
    pub fn totals(&self, pricing: &PricingConfig) -> CartTotals {
        let items_price: Money = self.lines.iter().map(CartLine::line_total).sum();
        let shipping_price = if items_price > pricing.free_shipping_threshold {
            Money::ZERO
        } else {
            pricing.flat_shipping_fee
        };
        let tax_price = items_price.scale(pricing.tax_rate).round_cents();
        let total_price = (items_price + shipping_price + tax_price).round_cents();

        OrderTotals {
            items_price,
            shipping_price,
            tax_price,
            total_price,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn line(id: i32, price: &str, qty: u32) -> CartLine {
        CartLine {
            product_id: ProductId::new(id),
            name: format!("Product {id}"),
            image: format!("/images/{id}.jpg"),
            unit_price: price.parse().unwrap(),
            quantity: qty,
        }
    }

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    #[test]
    fn two_hundred_in_items_ships_free_with_fifteen_percent_tax() {
        let mut cart = Cart::new();
        cart.add_or_update(line(1, "100", 2)).unwrap();

        let totals = cart.totals(&PricingConfig::default());
        assert_eq!(totals.items_price, money("200"));
        assert_eq!(totals.shipping_price, Money::ZERO);
        assert_eq!(totals.tax_price, money("30.00"));
        assert_eq!(totals.total_price, money("230.00"));
    }

    #[test]
    fn threshold_is_exclusive() {
        let mut cart = Cart::new();
        cart.add_or_update(line(1, "100", 1)).unwrap();

        let totals = cart.totals(&PricingConfig::default());
        assert_eq!(totals.shipping_price, money("10"));
        assert_eq!(totals.total_price, money("125.00"));
    }

    #[test]
    fn empty_cart_still_quotes_the_flat_fee() {
        let totals = Cart::new().totals(&PricingConfig::default());
        assert_eq!(totals.items_price, Money::ZERO);
        assert_eq!(totals.shipping_price, money("10"));
        assert_eq!(totals.total_price, money("10"));
    }

    #[test]
    fn re_adding_a_product_replaces_its_line() {
        let mut cart = Cart::new();
        cart.add_or_update(line(1, "10", 3)).unwrap();
        cart.add_or_update(line(2, "5", 1)).unwrap();
        cart.add_or_update(line(1, "10", 1)).unwrap();

        assert_eq!(cart.lines().len(), 2);
        assert_eq!(cart.lines()[0].quantity, 1);
        assert_eq!(cart.item_count(), 2);
    }

    #[test]
    fn zero_quantity_is_rejected_and_cart_unchanged() {
        let mut cart = Cart::new();
        cart.add_or_update(line(1, "10", 2)).unwrap();

        assert_eq!(
            cart.add_or_update(line(1, "10", 0)),
            Err(CartError::InvalidQuantity)
        );
        assert_eq!(cart.lines()[0].quantity, 2);
    }

    #[test]
    fn removing_a_missing_product_is_a_no_op() {
        let mut cart = Cart::new();
        cart.add_or_update(line(1, "10", 2)).unwrap();

        assert!(!cart.remove(ProductId::new(99)));
        assert!(cart.remove(ProductId::new(1)));
        assert!(cart.is_empty());
    }

    #[test]
    fn tax_rounds_to_cents() {
        let mut cart = Cart::new();
        cart.add_or_update(line(1, "33.33", 1)).unwrap();

        let totals = cart.totals(&PricingConfig::default());
        // 0.15 * 33.33 = 4.9995
        assert_eq!(totals.tax_price, money("5.00"));
        assert_eq!(totals.total_price, money("48.33"));
    }

    #[test]
    fn totals_hold_across_mutation_sequences() {
        let pricing = PricingConfig::default();
        let prices = ["0.99", "12.50", "49.99", "100", "7.25", "250.10"];
        let mut cart = Cart::new();

        for step in 0_u32..60 {
            let id = i32::try_from(step % 7).unwrap();
            if step % 5 == 4 {
                cart.remove(ProductId::new(id));
            } else {
                let price = prices[(step as usize) % prices.len()];
                cart.add_or_update(line(id, price, step % 4 + 1)).unwrap();
            }

            let totals = cart.totals(&pricing);
            let expected_items: Money = cart
                .lines()
                .iter()
                .map(|l| l.unit_price * l.quantity)
                .sum();
            assert_eq!(totals.items_price, expected_items);
            assert_eq!(
                totals.total_price,
                (totals.items_price + totals.shipping_price + totals.tax_price).round_cents()
            );
            if totals.items_price > pricing.free_shipping_threshold {
                assert_eq!(totals.shipping_price, Money::ZERO);
            } else {
                assert_eq!(totals.shipping_price, pricing.flat_shipping_fee);
            }
        }
    }

    #[test]
    fn custom_pricing_applies() {
        let pricing = PricingConfig {
            free_shipping_threshold: money("500"),
            flat_shipping_fee: money("40"),
            tax_rate: Decimal::new(18, 2),
        };
        let mut cart = Cart::new();
        cart.add_or_update(line(1, "100", 2)).unwrap();

        let totals = cart.totals(&pricing);
        assert_eq!(totals.shipping_price, money("40"));
        assert_eq!(totals.tax_price, money("36.00"));
        assert_eq!(totals.total_price, money("276.00"));
    }
}
