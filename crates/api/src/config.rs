//! Application configuration loaded from environment variables.

use std::str::FromStr;

use domain::{AdjustmentMode, CartLimits, FactoryConfig, Money, PricingConfig};
use rust_decimal::Decimal;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `"info"`)
/// - `DATABASE_URL`: PostgreSQL stores when set, in-memory otherwise
/// - `FREE_DELIVERY_THRESHOLD`, `BASE_DELIVERY_CHARGE`: whole rupees
/// - `PLATFORM_FEE_RATE`, `GST_RATE`: fractions (`0.02` is 2%)
/// - `MAX_COUPON_PERCENT`, `MAX_REWARD_PERCENT`: percentages
/// - `MAX_QUANTITY_PER_ITEM`, `ORDER_NUMBER_PREFIX`
/// - `STOCK_ADJUSTMENT_MODE`: `transactional` or `best-effort`
///
/// Unparseable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub pricing: PricingConfig,
    pub cart_limits: CartLimits,
    pub factory: FactoryConfig,
    pub stock_mode: AdjustmentMode,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parse = |key: &str| lookup(key).map(|v| v.trim().to_string());

        let rupees = |key: &str, default: Money| {
            parse(key)
                .and_then(|v| v.parse::<i64>().ok())
                .map(Money::from_rupees)
                .unwrap_or(default)
        };
        let decimal = |key: &str, default: Decimal| {
            parse(key)
                .and_then(|v| Decimal::from_str(&v).ok())
                .unwrap_or(default)
        };

        let pricing = PricingConfig {
            free_delivery_threshold: rupees(
                "FREE_DELIVERY_THRESHOLD",
                defaults.pricing.free_delivery_threshold,
            ),
            base_delivery_charge: rupees(
                "BASE_DELIVERY_CHARGE",
                defaults.pricing.base_delivery_charge,
            ),
            platform_fee_rate: decimal("PLATFORM_FEE_RATE", defaults.pricing.platform_fee_rate),
            gst_rate: decimal("GST_RATE", defaults.pricing.gst_rate),
            max_coupon_percent: decimal("MAX_COUPON_PERCENT", defaults.pricing.max_coupon_percent),
            max_reward_percent_of_subtotal: decimal(
                "MAX_REWARD_PERCENT",
                defaults.pricing.max_reward_percent_of_subtotal,
            ),
        };

        Self {
            host: parse("HOST").unwrap_or(defaults.host),
            port: parse("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: parse("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: parse("DATABASE_URL").filter(|url| !url.is_empty()),
            pricing,
            cart_limits: CartLimits {
                max_quantity_per_item: parse("MAX_QUANTITY_PER_ITEM")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.cart_limits.max_quantity_per_item),
            },
            factory: FactoryConfig {
                order_number_prefix: parse("ORDER_NUMBER_PREFIX")
                    .filter(|p| !p.is_empty())
                    .unwrap_or(defaults.factory.order_number_prefix),
            },
            stock_mode: parse("STOCK_ADJUSTMENT_MODE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.stock_mode),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            pricing: PricingConfig::default(),
            cart_limits: CartLimits::default(),
            factory: FactoryConfig::default(),
            stock_mode: AdjustmentMode::default(),
        }
    }
}
