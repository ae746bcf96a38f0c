use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::{CouponLookup, PricingError};
use crate::money::Money;
use crate::order::{OrderLineItem, OrderTotals};

/// Store-wide pricing constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// Flat tax rate applied to the discounted subtotal (`0.18` is 18 %).
    pub tax_rate: Decimal,
    /// Discounted subtotals at or above this ship free.
    pub free_shipping_threshold: Money,
    pub flat_shipping_fee: Money,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate: dec!(0.18),
            free_shipping_threshold: Money::new(dec!(1000)),
            flat_shipping_fee: Money::new(dec!(50)),
        }
    }
}

/// Priced totals for a set of line items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub totals: OrderTotals,
    /// Code of the coupon that was applied, if any.
    pub coupon_code: Option<String>,
}

/// Computes order totals. Pure: never touches coupon usage counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct PricingEngine {
    policy: PricingPolicy,
}

impl PricingEngine {
    pub fn new(policy: PricingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PricingPolicy {
        &self.policy
    }

    /// Prices `lines`, applying `coupon` if one was supplied.
    pub fn quote(
        &self,
        lines: &[OrderLineItem],
        coupon: Option<&CouponLookup>,
        now: DateTime<Utc>,
    ) -> Result<Quote, PricingError> {
        if let Some(line) = lines.iter().find(|l| l.unit_price.is_negative()) {
            return Err(PricingError::NegativePrice {
                sku: line.sku.clone(),
            });
        }

        let subtotal: Money = lines.iter().map(|l| l.unit_price.times(l.quantity)).sum();

        let (discount, coupon_code) = match coupon {
            None => (Money::ZERO, None),
            Some(CouponLookup::Missing(code)) => {
                return Err(PricingError::InvalidCoupon {
                    code: code.clone(),
                    reason: "coupon does not exist",
                });
            }
            Some(CouponLookup::Found(coupon)) => {
                coupon.validate(subtotal, now)?;
                (coupon.discount_for(subtotal), Some(coupon.code.clone()))
            }
        };

        let discounted = subtotal.saturating_sub(discount);
        let shipping_cost = self.shipping_for(discounted);
        let tax = discounted.scale(self.policy.tax_rate).rounded();
        let total = discounted + tax + shipping_cost;

        tracing::debug!(
            %subtotal, %discount, %tax, %shipping_cost, %total,
            lines = lines.len(),
            "order priced"
        );

        Ok(Quote {
            totals: OrderTotals {
                subtotal,
                discount,
                tax,
                shipping_cost,
                total,
            },
            coupon_code,
        })
    }

    fn shipping_for(&self, discounted: Money) -> Money {
        if discounted >= self.policy.free_shipping_threshold {
            Money::ZERO
        } else {
            self.policy.flat_shipping_fee
        }
    }
}
