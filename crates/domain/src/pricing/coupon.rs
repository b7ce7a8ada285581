use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::PricingError;
use crate::Money;

/// How a coupon's value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    /// `value` is a percentage of the subtotal.
    Percentage,
    /// `value` is an amount in rupees.
    Fixed,
}

/// A discount descriptor applied to a cart.
///
/// Coupons are validated against the catalog by the caller; the cart only
/// checks that the numbers are self-consistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    pub discount_type: DiscountType,
    pub value: Decimal,
    /// Cap on the discount of a percentage coupon.
    #[serde(default)]
    pub max_discount: Option<Money>,
}

impl Coupon {
    /// Creates a percentage coupon.
    pub fn percentage(code: impl Into<String>, percent: Decimal) -> Self {
        Self {
            code: code.into(),
            discount_type: DiscountType::Percentage,
            value: percent,
            max_discount: None,
        }
    }

    /// Creates a fixed-amount coupon.
    pub fn fixed(code: impl Into<String>, amount: Money) -> Self {
        Self {
            code: code.into(),
            discount_type: DiscountType::Fixed,
            value: amount.to_decimal(),
            max_discount: None,
        }
    }

    /// Caps the discount at `cap`.
    pub fn capped_at(mut self, cap: Money) -> Self {
        self.max_discount = Some(cap);
        self
    }

    /// Rejects negative amounts and percentages above 100.
    pub fn validate(&self) -> Result<(), PricingError> {
        let invalid = |reason| PricingError::InvalidCouponAmount {
            code: self.code.clone(),
            reason,
        };

        if self.value.is_sign_negative() {
            return Err(invalid("value must not be negative"));
        }
        if self.discount_type == DiscountType::Percentage && self.value > Decimal::ONE_HUNDRED {
            return Err(invalid("percentage must not exceed 100"));
        }
        if self.max_discount.is_some_and(|cap| cap.is_negative()) {
            return Err(invalid("discount cap must not be negative"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_accepts_sane_coupons() {
        assert!(Coupon::percentage("SAVE10", dec!(10)).validate().is_ok());
        assert!(
            Coupon::fixed("FLAT50", Money::from_rupees(50))
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_validate_rejects_negative_and_oversized() {
        let negative = Coupon::fixed("BAD", Money::from_rupees(-5));
        assert!(matches!(
            negative.validate(),
            Err(PricingError::InvalidCouponAmount { .. })
        ));

        let oversized = Coupon::percentage("BAD", dec!(120));
        assert!(oversized.validate().is_err());

        let bad_cap = Coupon::percentage("BAD", dec!(10)).capped_at(Money::from_paise(-1));
        assert!(bad_cap.validate().is_err());
    }

    #[test]
    fn test_discount_type_serialization() {
        let json = serde_json::to_string(&DiscountType::Percentage).unwrap();
        assert_eq!(json, "\"percentage\"");
    }
}
