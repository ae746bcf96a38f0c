use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::PricingError;
use crate::error::UnknownVariant;
use crate::money::Money;

/// How a coupon's `discount_value` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    /// `discount_value` is a percentage of the subtotal.
    Percentage,
    /// `discount_value` is an absolute amount.
    FixedAmount,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "PERCENTAGE",
            DiscountType::FixedAmount => "FIXED_AMOUNT",
        }
    }
}

impl std::str::FromStr for DiscountType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PERCENTAGE" => Ok(DiscountType::Percentage),
            "FIXED_AMOUNT" => Ok(DiscountType::FixedAmount),
            other => Err(UnknownVariant::new("discount type", other)),
        }
    }
}

/// A discount code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub min_purchase: Option<Money>,
    pub max_discount: Option<Money>,
    pub usage_limit: Option<u32>,
    pub usage_count: u32,
    pub is_active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Coupon {
    fn with_type(code: impl Into<String>, discount_type: DiscountType, value: Decimal) -> Self {
        Self {
            code: code.into(),
            discount_type,
            discount_value: value,
            min_purchase: None,
            max_discount: None,
            usage_limit: None,
            usage_count: 0,
            is_active: true,
            starts_at: None,
            expires_at: None,
        }
    }

    /// An active, unrestricted percentage coupon.
    pub fn percentage(code: impl Into<String>, percent: Decimal) -> Self {
        Self::with_type(code, DiscountType::Percentage, percent)
    }

    /// An active, unrestricted fixed-amount coupon.
    pub fn fixed(code: impl Into<String>, amount: Money) -> Self {
        Self::with_type(code, DiscountType::FixedAmount, amount.amount())
    }

    pub fn with_min_purchase(mut self, min: Money) -> Self {
        self.min_purchase = Some(min);
        self
    }

    pub fn with_max_discount(mut self, max: Money) -> Self {
        self.max_discount = Some(max);
        self
    }

    pub fn with_usage_limit(mut self, limit: u32) -> Self {
        self.usage_limit = Some(limit);
        self
    }

    pub fn with_window(
        mut self,
        starts_at: Option<DateTime<Utc>>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.starts_at = starts_at;
        self.expires_at = expires_at;
        self
    }

    /// Returns true if another order may still apply this coupon.
    pub fn has_uses_left(&self) -> bool {
        self.usage_limit.is_none_or(|limit| self.usage_count < limit)
    }

    /// Checks whether the coupon applies to `subtotal` at `now`.
    pub fn validate(&self, subtotal: Money, now: DateTime<Utc>) -> Result<(), PricingError> {
        let invalid = |reason| PricingError::InvalidCoupon {
            code: self.code.clone(),
            reason,
        };

        if !self.is_active {
            return Err(invalid("coupon is not active"));
        }
        if self.starts_at.is_some_and(|start| now < start) {
            return Err(invalid("coupon is not yet valid"));
        }
        if self.expires_at.is_some_and(|end| now > end) {
            return Err(invalid("coupon has expired"));
        }
        if let Some(min_purchase) = self.min_purchase.filter(|min| subtotal < *min) {
            return Err(PricingError::MinPurchaseNotMet {
                code: self.code.clone(),
                min_purchase,
                subtotal,
            });
        }
        if !self.has_uses_left() {
            return Err(PricingError::UsageLimitExceeded {
                code: self.code.clone(),
            });
        }
        Ok(())
    }

    /// Discount this coupon gives on `subtotal`.
    ///
    /// Never exceeds the subtotal; rounded to two places.
    pub fn discount_for(&self, subtotal: Money) -> Money {
        let raw = match self.discount_type {
            DiscountType::Percentage => {
                let discount = subtotal.percent(self.discount_value);
                match self.max_discount {
                    Some(cap) => discount.min(cap),
                    None => discount,
                }
            }
            DiscountType::FixedAmount => Money::new(self.discount_value),
        };

        raw.max(Money::ZERO).min(subtotal).rounded()
    }
}

/// Result of resolving a coupon code supplied with a checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CouponLookup {
    Found(Coupon),
    /// No coupon exists with this code.
    Missing(String),
}

impl CouponLookup {
    pub fn code(&self) -> &str {
        match self {
            CouponLookup::Found(coupon) => &coupon.code,
            CouponLookup::Missing(code) => code,
        }
    }
}
