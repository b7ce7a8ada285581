//! Money amounts in the smallest currency unit.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Money amount represented in paise to avoid floating point issues.
///
/// Serializes as the raw paise count (e.g. `14300` for ₹143.00).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money {
    paise: i64,
}

impl Money {
    /// Creates a new amount from paise.
    pub fn from_paise(paise: i64) -> Self {
        Self { paise }
    }

    /// Creates a new amount from whole rupees.
    pub fn from_rupees(rupees: i64) -> Self {
        Self {
            paise: rupees * 100,
        }
    }

    /// Converts a rupee value, rounding half-up to the paisa.
    pub fn from_decimal(rupees: Decimal) -> Self {
        let paise = (rupees * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        Self {
            paise: paise.to_i64().unwrap_or(i64::MAX),
        }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { paise: 0 }
    }

    /// Returns the amount in paise.
    pub fn paise(&self) -> i64 {
        self.paise
    }

    /// Returns the whole-rupee portion.
    pub fn rupees(&self) -> i64 {
        self.paise / 100
    }

    /// Returns the paise portion (remainder after rupees).
    pub fn paise_part(&self) -> i64 {
        self.paise.abs() % 100
    }

    /// Returns the amount in rupees as an exact decimal.
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.paise, 2)
    }

    /// Multiplies by a rate and rounds half-up to the whole rupee.
    pub fn scale_to_rupee(&self, rate: Decimal) -> Money {
        let rupees = (self.to_decimal() * rate)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        Money::from_decimal(rupees)
    }

    /// Multiplies by a rate and rounds half-up to the paisa.
    pub fn scale(&self, rate: Decimal) -> Money {
        Money::from_decimal(self.to_decimal() * rate)
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.paise > 0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.paise == 0
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.paise < 0
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            paise: self.paise * i64::from(quantity),
        }
    }

    /// Clamps negative amounts to zero.
    pub fn floor_zero(self) -> Money {
        self.max(Money::zero())
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.paise < 0 {
            write!(f, "-₹{}.{:02}", self.rupees().abs(), self.paise_part())
        } else {
            write!(f, "₹{}.{:02}", self.rupees(), self.paise_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            paise: self.paise + rhs.paise,
        }
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money {
            paise: self.paise - rhs.paise,
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.paise += rhs.paise;
    }
}

impl std::ops::SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.paise -= rhs.paise;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_parts() {
        let money = Money::from_paise(1234);
        assert_eq!(money.paise(), 1234);
        assert_eq!(money.rupees(), 12);
        assert_eq!(money.paise_part(), 34);
        assert_eq!(Money::from_rupees(50).paise(), 5000);
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_paise(1234).to_string(), "₹12.34");
        assert_eq!(Money::from_paise(5).to_string(), "₹0.05");
        assert_eq!(Money::from_paise(-1234).to_string(), "-₹12.34");
    }

    #[test]
    fn test_from_decimal_rounds_half_up() {
        assert_eq!(Money::from_decimal(dec!(1.005)).paise(), 101);
        assert_eq!(Money::from_decimal(dec!(1.004)).paise(), 100);
        assert_eq!(Money::from_decimal(dec!(9)).paise(), 900);
    }

    #[test]
    fn test_scale_to_rupee() {
        let subtotal = Money::from_rupees(90);
        assert_eq!(subtotal.scale_to_rupee(dec!(0.02)), Money::from_rupees(2));
        assert_eq!(subtotal.scale_to_rupee(dec!(0.12)), Money::from_rupees(11));
        assert_eq!(
            Money::from_rupees(25).scale_to_rupee(dec!(0.02)),
            Money::from_rupees(1)
        );
    }

    #[test]
    fn test_money_arithmetic() {
        let a = Money::from_paise(1000);
        let b = Money::from_paise(500);

        assert_eq!((a + b).paise(), 1500);
        assert_eq!((a - b).paise(), 500);
        assert_eq!(a.multiply(3).paise(), 3000);
        assert_eq!((b - a).floor_zero(), Money::zero());
        assert_eq!(vec![a, b].into_iter().sum::<Money>().paise(), 1500);
    }

    #[test]
    fn test_serializes_as_paise() {
        let json = serde_json::to_string(&Money::from_paise(14300)).unwrap();
        assert_eq!(json, "14300");
    }
}
