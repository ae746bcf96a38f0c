//! Order aggregate.

use chrono::{DateTime, Utc};
use common::{AddressId, OrderId, UserId};
use serde::{Deserialize, Serialize};

use super::{
    InvalidTransition, OrderLineItem, OrderStatus, OrderTotals, PaymentMethod, validate_transition,
};

/// Everything needed to place an order once stock is reserved and priced.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: String,
    pub user_id: UserId,
    pub items: Vec<OrderLineItem>,
    pub totals: OrderTotals,
    pub coupon_code: Option<String>,
    pub shipping_address_id: AddressId,
    pub billing_address_id: AddressId,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
}

/// A placed order.
///
/// Line items and totals are frozen at placement; only the status (and the
/// bookkeeping that follows it) changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub user_id: UserId,
    pub status: OrderStatus,

    /// Optimistic concurrency counter, bumped on every status change.
    pub version: i64,

    pub totals: OrderTotals,
    pub coupon_code: Option<String>,
    pub items: Vec<OrderLineItem>,
    pub shipping_address_id: AddressId,
    pub billing_address_id: AddressId,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a `Pending` order at version 1.
    pub fn place(new: NewOrder, now: DateTime<Utc>) -> Self {
        Self {
            id: OrderId::new(),
            order_number: new.order_number,
            user_id: new.user_id,
            status: OrderStatus::Pending,
            version: 1,
            totals: new.totals,
            coupon_code: new.coupon_code,
            items: new.items,
            shipping_address_id: new.shipping_address_id,
            billing_address_id: new.billing_address_id,
            payment_method: new.payment_method,
            notes: new.notes,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the order to `to`, bumping the version.
    ///
    /// `reason` is recorded as the cancellation reason when `to` is
    /// `Cancelled`. A self-transition is accepted and changes nothing.
    pub fn transition(
        &mut self,
        to: OrderStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        validate_transition(self.status, to, Some(&self.order_number))?;
        if self.status == to {
            return Ok(());
        }

        if to == OrderStatus::Cancelled {
            self.cancellation_reason = reason.map(str::to_string);
        }
        self.status = to;
        self.version += 1;
        self.updated_at = now;
        Ok(())
    }

    /// Total units across all line items.
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }
}
