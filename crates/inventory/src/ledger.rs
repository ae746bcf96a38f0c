use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{ProductId, Result, VariantId};

/// Default time budget for a single `reserve` call.
pub const DEFAULT_RESERVE_TIMEOUT: Duration = Duration::from_secs(2);

/// First backoff delay after a transient conflict.
pub(crate) const BASE_BACKOFF: Duration = Duration::from_millis(10);

/// Upper bound for a single backoff delay.
pub(crate) const MAX_BACKOFF: Duration = Duration::from_millis(200);

/// Stock record for one purchasable variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryUnit {
    pub variant_id: VariantId,
    pub product_id: ProductId,
    pub sku: String,
    pub stock: u32,
    pub is_active: bool,
}

impl InventoryUnit {
    /// Creates an active unit with the given stock.
    pub fn new(
        variant_id: VariantId,
        product_id: ProductId,
        sku: impl Into<String>,
        stock: u32,
    ) -> Self {
        Self {
            variant_id,
            product_id,
            sku: sku.into(),
            stock,
            is_active: true,
        }
    }

    /// Marks the unit as not for sale.
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Non-locking stock snapshot, for display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub available: bool,
    pub current_stock: u32,
}

impl Availability {
    pub(crate) fn of(stock: u32, is_active: bool, quantity: u32) -> Self {
        Self {
            available: is_active && stock >= quantity,
            current_stock: stock,
        }
    }
}

/// Per-variant stock counter with conditional decrement and compensating increment.
///
/// Implementations must guarantee that concurrent `reserve` calls never hand
/// out more units than were in stock, and must never decrement twice for one
/// successful call.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Decrements stock by `quantity` if at least that much is available.
    ///
    /// Returns `Ok(false)` when stock is insufficient, when a concurrent writer
    /// won the race, or when `timeout` elapses under contention. Returns an
    /// error only for structural problems (missing or inactive variant,
    /// storage failure) so callers can tell "stop" apart from "out of stock".
    async fn reserve(&self, variant_id: VariantId, quantity: u32, timeout: Duration)
    -> Result<bool>;

    /// Increments stock by `quantity`.
    ///
    /// Used to compensate reservations. Never fails the caller: errors are
    /// logged and counted, then dropped.
    async fn release(&self, variant_id: VariantId, quantity: u32);

    /// Reads current stock without taking locks.
    ///
    /// Must not be used to decide whether a purchase may proceed.
    async fn check_availability(&self, variant_id: VariantId, quantity: u32)
    -> Result<Availability>;
}

/// Returns the backoff delay before retry number `attempt` (1-based).
pub(crate) fn backoff(attempt: u32) -> Duration {
    let factor = 1u32 << attempt.saturating_sub(1).min(5);
    (BASE_BACKOFF * factor).min(MAX_BACKOFF)
}

pub(crate) fn record_reservation(outcome: &'static str) {
    metrics::counter!("inventory_reservations_total", "outcome" => outcome).increment(1);
}

pub(crate) fn record_release_failure() {
    metrics::counter!("inventory_release_failures_total").increment(1);
}
