use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use super::{Coupon, DiscountType, PricingConfig};
use crate::Money;

/// A line item the engine can price.
pub trait PricedItem {
    /// Selling price of one unit.
    fn unit_price(&self) -> Money;

    /// Maximum retail price of one unit.
    fn unit_mrp(&self) -> Money;

    /// Number of units.
    fn quantity(&self) -> u32;
}

/// Derived totals of a cart or order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub subtotal: Money,
    pub total_mrp: Money,
    pub item_discount: Money,
    pub delivery_charge: Money,
    pub platform_fee: Money,
    pub gst: Money,
    pub coupon_discount: Money,
    pub reward_discount: Money,
    /// Points consumed by `reward_discount` (one point per rupee).
    pub reward_points_redeemed: u32,
    pub final_amount: Money,
}

impl PriceBreakdown {
    /// Total saved against MRP, coupons and rewards.
    pub fn savings(&self) -> Money {
        self.item_discount + self.coupon_discount + self.reward_discount
    }
}

/// Stateless pricing calculator.
#[derive(Debug, Clone, Default)]
pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    /// Creates an engine with the given configuration.
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    /// Prices a set of line items.
    ///
    /// An empty item list prices to the all-zero breakdown.
    pub fn price<I: PricedItem>(
        &self,
        items: &[I],
        coupon: Option<&Coupon>,
        reward_points: u32,
    ) -> PriceBreakdown {
        if items.is_empty() {
            return PriceBreakdown::default();
        }

        let subtotal: Money = items
            .iter()
            .map(|i| i.unit_price().multiply(i.quantity()))
            .sum();
        let total_mrp: Money = items
            .iter()
            .map(|i| i.unit_mrp().multiply(i.quantity()))
            .sum();
        let item_discount = (total_mrp - subtotal).floor_zero();

        let delivery_charge = if subtotal >= self.config.free_delivery_threshold {
            Money::zero()
        } else {
            self.config.base_delivery_charge
        };

        let platform_fee = subtotal.scale_to_rupee(self.config.platform_fee_rate);
        let gst = subtotal.scale_to_rupee(self.config.gst_rate);

        let coupon_discount = coupon
            .map(|c| self.coupon_discount(c, subtotal))
            .unwrap_or_default();

        let reward_discount = self.reward_discount(reward_points, subtotal);
        let reward_points_redeemed = u32::try_from(reward_discount.rupees()).unwrap_or(u32::MAX);

        let final_amount = (subtotal + delivery_charge + platform_fee + gst
            - coupon_discount
            - reward_discount)
            .floor_zero();

        PriceBreakdown {
            subtotal,
            total_mrp,
            item_discount,
            delivery_charge,
            platform_fee,
            gst,
            coupon_discount,
            reward_discount,
            reward_points_redeemed,
            final_amount,
        }
    }

    fn coupon_discount(&self, coupon: &Coupon, subtotal: Money) -> Money {
        let discount = match coupon.discount_type {
            DiscountType::Percentage => {
                let percent = coupon.value.min(self.config.max_coupon_percent);
                let discount = subtotal.scale(percent / Decimal::ONE_HUNDRED);
                match coupon.max_discount {
                    Some(cap) => discount.min(cap),
                    None => discount,
                }
            }
            DiscountType::Fixed => Money::from_decimal(coupon.value),
        };

        discount.floor_zero().min(subtotal)
    }

    fn reward_discount(&self, requested_points: u32, subtotal: Money) -> Money {
        // Points beyond the per-order cap are clamped, not rejected.
        let cap_rupees = (subtotal.to_decimal() * self.config.max_reward_percent_of_subtotal
            / Decimal::ONE_HUNDRED)
            .floor()
            .to_i64()
            .unwrap_or(0);

        Money::from_rupees(i64::from(requested_points).min(cap_rupees.max(0)))
    }
}
