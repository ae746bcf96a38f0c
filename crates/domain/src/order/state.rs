//! Order status state machine.

use serde::{Deserialize, Serialize};

use super::InvalidTransition;
use crate::error::UnknownVariant;

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► Processing ──► Shipped ──► Delivered
///    │            │             │            │
///    └────────────┴──► Cancelled └──► Refunded ◄┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order placed, stock reserved, awaiting fulfilment.
    #[default]
    Pending,

    /// Payment confirmed, order being prepared.
    Processing,

    /// Handed to the carrier.
    Shipped,

    /// Received by the customer.
    Delivered,

    /// Cancelled before shipping (terminal state).
    Cancelled,

    /// Money returned after shipping (terminal state).
    Refunded,
}

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    /// Returns the statuses reachable from this one in a single step.
    ///
    /// Identity transitions are not listed; they are always valid.
    pub fn allowed_transitions(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Processing, Cancelled],
            Processing => &[Shipped, Cancelled],
            Shipped => &[Delivered, Refunded],
            Delivered => &[Refunded],
            Cancelled | Refunded => &[],
        }
    }

    /// Returns true if the order can move to `Cancelled` from this status.
    pub fn can_cancel(&self) -> bool {
        self.allowed_transitions().contains(&OrderStatus::Cancelled)
    }

    /// Returns true if the order can move to `Refunded` from this status.
    pub fn can_refund(&self) -> bool {
        self.allowed_transitions().contains(&OrderStatus::Refunded)
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Returns true while the order contents may still be changed.
    pub fn can_modify(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }

    /// Returns the status name as stored and displayed.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                tracing::warn!(status = s, "unknown order status");
                UnknownVariant::new("order status", s)
            })
    }
}

/// Returns true if an order may move from `from` to `to`.
///
/// A status may always "transition" to itself.
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    from == to || from.allowed_transitions().contains(&to)
}

/// Fails with [`InvalidTransition`] unless `from → to` is allowed.
///
/// `context` is carried into the error, typically the order number.
pub fn validate_transition(
    from: OrderStatus,
    to: OrderStatus,
    context: Option<&str>,
) -> Result<(), InvalidTransition> {
    if is_valid_transition(from, to) {
        Ok(())
    } else {
        Err(InvalidTransition {
            from,
            to,
            context: context.map(str::to_string),
        })
    }
}
