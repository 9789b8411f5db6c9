//! Fixed-point monetary values

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// A monetary value in integer minor units (cents) of a currency.
///
/// Arithmetic between two values assumes both carry the same symbol; the
/// result always keeps the symbol of the left operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency {
    #[serde(rename = "value")]
    pub amount: i64,
    pub symbol: String,
}

impl Currency {
    pub fn new(amount: i64, symbol: &str) -> Self {
        Self {
            amount,
            symbol: symbol.to_string(),
        }
    }

    pub fn zero(symbol: &str) -> Self {
        Self::new(0, symbol)
    }

    /// Converts a value given in major units (e.g. `181.10`) to minor units.
    pub fn from_major(value: f64, symbol: &str) -> Self {
        Self::new(round_minor(value * 100.0), symbol)
    }

    pub fn to_major(&self) -> f64 {
        self.amount as f64 / 100.0
    }

    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }

    pub fn plus(&self, other: &Currency) -> Currency {
        Currency::new(self.amount + other.amount, &self.symbol)
    }

    pub fn minus(&self, other: &Currency) -> Currency {
        Currency::new(self.amount - other.amount, &self.symbol)
    }

    /// Adds `other` in place; an absent value counts as zero.
    pub fn plus_assign_opt(&mut self, other: Option<&Currency>) {
        if let Some(o) = other {
            self.amount += o.amount;
        }
    }

    pub fn times(&self, factor: f64) -> Currency {
        Currency::new(round_minor(self.amount as f64 * factor), &self.symbol)
    }

    /// Divides by `divisor`, yielding zero when the quotient is not finite.
    pub fn divide(&self, divisor: f64) -> Currency {
        Currency::new(round_minor(self.amount as f64 / divisor), &self.symbol)
    }
}

// f64::round rounds half away from zero
fn round_minor(value: f64) -> i64 {
    if value.is_finite() {
        value.round() as i64
    } else {
        0
    }
}

impl Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2} {}", self.to_major(), self.symbol)
    }
}

impl Add for Currency {
    type Output = Currency;

    fn add(self, rhs: Currency) -> Currency {
        self.plus(&rhs)
    }
}

impl Sub for Currency {
    type Output = Currency;

    fn sub(self, rhs: Currency) -> Currency {
        self.minus(&rhs)
    }
}

impl AddAssign<&Currency> for Currency {
    fn add_assign(&mut self, rhs: &Currency) {
        self.amount += rhs.amount;
    }
}

impl SubAssign<&Currency> for Currency {
    fn sub_assign(&mut self, rhs: &Currency) {
        self.amount -= rhs.amount;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic_keeps_left_symbol() {
        let a = Currency::new(1000, "EUR");
        let b = Currency::new(250, "EUR");

        assert_eq!(a.plus(&b), Currency::new(1250, "EUR"));
        assert_eq!(a.minus(&b), Currency::new(750, "EUR"));
        assert_eq!(a.clone() + b.clone(), Currency::new(1250, "EUR"));
        assert_eq!(b - a, Currency::new(-750, "EUR"));
    }

    #[test]
    fn test_plus_assign_treats_none_as_zero() {
        let mut c = Currency::new(100, "EUR");
        c.plus_assign_opt(None);
        assert_eq!(c.amount, 100);
        c.plus_assign_opt(Some(&Currency::new(5, "EUR")));
        assert_eq!(c.amount, 105);
    }

    #[test]
    fn test_times_and_divide_round_half_away_from_zero() {
        let c = Currency::new(5, "EUR");
        assert_eq!(c.times(0.5).amount, 3);
        assert_eq!(Currency::new(-5, "EUR").times(0.5).amount, -3);
        assert_eq!(Currency::new(491425, "EUR").divide(25.0).amount, 19657);
        assert_eq!(Currency::new(18110, "EUR").times(5.0).amount, 90550);
    }

    #[test]
    fn test_divide_by_zero_yields_zero() {
        assert_eq!(Currency::new(1000, "EUR").divide(0.0), Currency::zero("EUR"));
        assert_eq!(Currency::zero("EUR").divide(0.0), Currency::zero("EUR"));
    }

    #[test]
    fn test_major_units() {
        let c = Currency::from_major(181.10, "USD");
        assert_eq!(c.amount, 18110);
        assert_eq!(c.to_major(), 181.10);
        assert_eq!(c.to_string(), "181.10 USD");
    }

    #[test]
    fn test_serialization_uses_value_field() {
        let json = serde_json::to_string(&Currency::new(42, "EUR")).unwrap();
        assert_eq!(json, r#"{"value":42,"symbol":"EUR"}"#);
        let back: Currency = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Currency::new(42, "EUR"));
    }
}
