//! Pricing: coupons, discounts, tax and shipping.

mod coupon;
mod engine;

pub use coupon::{Coupon, CouponLookup, DiscountType};
pub use engine::{PricingEngine, PricingPolicy, Quote};

use thiserror::Error;

use crate::money::Money;

/// Business-rule failures while pricing an order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    /// Coupon is missing, inactive, or outside its validity window.
    #[error("Invalid coupon {code}: {reason}")]
    InvalidCoupon { code: String, reason: &'static str },

    #[error("Coupon {code} requires a minimum purchase of {min_purchase} (subtotal is {subtotal})")]
    MinPurchaseNotMet {
        code: String,
        min_purchase: Money,
        subtotal: Money,
    },

    #[error("Coupon {code} has reached its usage limit")]
    UsageLimitExceeded { code: String },

    /// A line item carried a negative unit price.
    #[error("Negative price for {sku}")]
    NegativePrice { sku: String },
}
