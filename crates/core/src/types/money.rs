//! Decimal money amounts.
//!
//! Prices, shipping, tax and totals are all `Money`. Arithmetic is exact
//! (`rust_decimal`), and [`Money::round_cents`] rounds half away from zero to two
//! places, which is what shoppers see on receipts.
//!
//! On the wire an amount is a plain JSON number (`230` or `230.0`), because the
//! browser client sends and expects numbers. Strings such as `"19.99"` are also
//! accepted when deserializing.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, Mul, Sub};
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Errors converting a [`Money`] amount.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// The amount does not fit the processor's integer minor units.
    #[error("amount {0} is out of range")]
    OutOfRange(Decimal),
}

/// A currency amount in major units (rupees, dollars).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(Decimal);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Largest amount a `NUMERIC(12, 2)` column holds: 9,999,999,999.99.
    pub const MAX_STORED: Self = Self(Decimal::from_parts(0xD4A5_0FFF, 0xE8, 0, false, 2));

    /// Wrap a decimal amount.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// A whole number of major units.
    #[must_use]
    pub fn from_major(units: i64) -> Self {
        Self(Decimal::from(units))
    }

    /// Build an amount from minor units, e.g. `from_minor(1999)` is 19.99.
    #[must_use]
    pub fn from_minor(minor: i64) -> Self {
        Self(Decimal::new(minor, 2))
    }

    /// The underlying decimal.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Round to two decimal places, half away from zero.
    #[must_use]
    pub fn round_cents(self) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// Multiply by a rate such as a tax rate. The result is not rounded.
    #[must_use]
    pub fn scale(self, rate: Decimal) -> Self {
        Self(self.0 * rate)
    }

    /// Whether the amount is below zero.
    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Whether the amount has fractions of a cent.
    #[must_use]
    pub fn is_sub_cent(&self) -> bool {
        self.round_cents() != *self
    }

    /// Whether the amount is too large to store.
    #[must_use]
    pub fn exceeds_stored_max(&self) -> bool {
        *self > Self::MAX_STORED
    }

    /// Addition that returns `None` instead of overflowing.
    #[must_use]
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// Multiplication by a quantity that returns `None` instead of overflowing.
    #[must_use]
    pub fn checked_mul(self, qty: u32) -> Option<Self> {
        self.0.checked_mul(Decimal::from(qty)).map(Self)
    }

    /// Whether the amount is exactly zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// The amount in minor units (paise, cents), rounded to the nearest unit.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::OutOfRange`] if the result does not fit an `i64`.
    pub fn to_minor_units(&self) -> Result<i64, MoneyError> {
        self.round_cents()
            .0
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|minor| minor.trunc().to_i64())
            .ok_or(MoneyError::OutOfRange(self.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim()).map(Self)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Mul<u32> for Money {
    type Output = Self;

    fn mul(self, qty: u32) -> Self {
        Self(self.0 * Decimal::from(qty))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value = self
            .0
            .to_f64()
            .ok_or_else(|| serde::ser::Error::custom("amount not representable as f64"))?;
        serializer.serialize_f64(value)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MoneyVisitor)
    }
}

struct MoneyVisitor;

impl Visitor<'_> for MoneyVisitor {
    type Value = Money;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a number or a decimal string")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Money, E> {
        Ok(Money(Decimal::from(v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Money, E> {
        Ok(Money(Decimal::from(v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Money, E> {
        // Go through the shortest decimal rendering so 19.99 stays 19.99.
        Decimal::from_str(&v.to_string())
            .map(Money)
            .map_err(|_| E::invalid_value(de::Unexpected::Float(v), &self))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Money, E> {
        Money::from_str(v).map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Money {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Decimal as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Money {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let amount = <Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(amount))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Money {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Decimal as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(money("2.345").round_cents(), money("2.35"));
        assert_eq!(money("2.344").round_cents(), money("2.34"));
        assert_eq!(money("-2.345").round_cents(), money("-2.35"));
    }

    #[test]
    fn arithmetic_is_exact() {
        let total: Money = [money("0.10"), money("0.20")].into_iter().sum();
        assert_eq!(total, money("0.30"));
        assert_eq!(money("19.99") * 3, money("59.97"));
        assert_eq!(money("10") - money("2.5"), money("7.5"));
    }

    #[test]
    fn converts_to_minor_units() {
        assert_eq!(money("230").to_minor_units().unwrap(), 23_000);
        assert_eq!(money("19.995").to_minor_units().unwrap(), 2_000);
        assert_eq!(Money::from_minor(1999), money("19.99"));
    }

    #[test]
    fn huge_amounts_are_out_of_range_not_a_panic() {
        let huge = money("1000000000000000000000000000");
        assert_eq!(huge.to_minor_units(), Err(MoneyError::OutOfRange(huge.amount())));
        assert_eq!(money("79000000000000000000000000000").checked_add(huge), None);
        assert_eq!(huge.checked_mul(1000), None);
        assert_eq!(money("19.99").checked_mul(3), Some(money("59.97")));
    }

    #[test]
    fn stored_max_matches_numeric_12_2() {
        assert_eq!(Money::MAX_STORED, money("9999999999.99"));
        assert!(!Money::MAX_STORED.exceeds_stored_max());
        assert!(money("10000000000").exceeds_stored_max());
        assert!(money("19.999").is_sub_cent());
        assert!(!money("19.99").is_sub_cent());
    }

    #[test]
    fn serializes_as_json_number() {
        assert_eq!(serde_json::to_value(money("230.00")).unwrap(), serde_json::json!(230.0));
    }

    #[test]
    fn deserializes_numbers_and_strings() {
        let from_float: Money = serde_json::from_str("19.99").unwrap();
        let from_int: Money = serde_json::from_str("20").unwrap();
        let from_str: Money = serde_json::from_str("\"5.50\"").unwrap();
        assert_eq!(from_float, money("19.99"));
        assert_eq!(from_int, Money::from_major(20));
        assert_eq!(from_str, money("5.5"));
        assert!(serde_json::from_str::<Money>("\"lots\"").is_err());
    }

    #[test]
    fn displays_two_places() {
        assert_eq!(Money::from_major(230).to_string(), "230.00");
        assert_eq!(money("0.5").to_string(), "0.50");
    }

    #[test]
    fn zero_is_not_negative() {
        assert!(!Money::ZERO.is_negative());
        assert!(money("-0.01").is_negative());
    }
}
