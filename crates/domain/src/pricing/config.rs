use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::Money;

/// Environment constants driving the pricing engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Subtotal at or above which delivery is free.
    pub free_delivery_threshold: Money,

    /// Delivery charge below the threshold.
    pub base_delivery_charge: Money,

    /// Platform fee as a fraction of the subtotal (0.02 = 2%).
    pub platform_fee_rate: Decimal,

    /// GST as a fraction of the subtotal (0.12 = 12%).
    pub gst_rate: Decimal,

    /// Upper bound for percentage coupons, in percent.
    pub max_coupon_percent: Decimal,

    /// Share of the subtotal redeemable with reward points, in percent.
    pub max_reward_percent_of_subtotal: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            free_delivery_threshold: Money::from_rupees(500),
            base_delivery_charge: Money::from_rupees(40),
            platform_fee_rate: dec!(0.02),
            gst_rate: dec!(0.12),
            max_coupon_percent: dec!(50),
            max_reward_percent_of_subtotal: dec!(10),
        }
    }
}
