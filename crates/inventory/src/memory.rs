use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::ledger::{
    Availability, InventoryLedger, InventoryUnit, record_release_failure, record_reservation,
};
use crate::{LedgerError, Result, VariantId};

/// In-memory ledger for tests and the single-process server.
///
/// A single mutex guards the whole map, so the read-check-decrement sequence
/// is atomic. Waiting for that mutex stands in for row-lock contention: a
/// caller that cannot acquire it within its timeout gets `Ok(false)`.
#[derive(Clone, Default)]
pub struct InMemoryInventoryLedger {
    units: Arc<Mutex<HashMap<VariantId, InventoryUnit>>>,
}

impl InMemoryInventoryLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ledger pre-populated with `units`.
    pub fn with_units(units: impl IntoIterator<Item = InventoryUnit>) -> Self {
        let map = units.into_iter().map(|u| (u.variant_id, u)).collect();
        Self {
            units: Arc::new(Mutex::new(map)),
        }
    }

    /// Inserts or replaces a unit.
    pub async fn insert_unit(&self, unit: InventoryUnit) {
        self.units.lock().await.insert(unit.variant_id, unit);
    }

    /// Returns the current stock for a variant.
    pub async fn stock_of(&self, variant_id: VariantId) -> Option<u32> {
        self.units.lock().await.get(&variant_id).map(|u| u.stock)
    }

    /// Toggles whether a variant is for sale.
    pub async fn set_active(&self, variant_id: VariantId, is_active: bool) {
        if let Some(unit) = self.units.lock().await.get_mut(&variant_id) {
            unit.is_active = is_active;
        }
    }

    /// Returns a copy of the unit.
    pub async fn unit(&self, variant_id: VariantId) -> Option<InventoryUnit> {
        self.units.lock().await.get(&variant_id).cloned()
    }
}

#[async_trait]
impl InventoryLedger for InMemoryInventoryLedger {
    #[tracing::instrument(skip(self))]
    async fn reserve(
        &self,
        variant_id: VariantId,
        quantity: u32,
        timeout: Duration,
    ) -> Result<bool> {
        let Ok(mut units) = tokio::time::timeout(timeout, self.units.lock()).await else {
            tracing::warn!(%variant_id, quantity, "reservation timed out waiting for stock lock");
            record_reservation("timeout");
            return Ok(false);
        };

        let unit = units
            .get_mut(&variant_id)
            .ok_or(LedgerError::NotFound(variant_id))?;

        if !unit.is_active {
            return Err(LedgerError::Inactive {
                variant_id,
                sku: unit.sku.clone(),
            });
        }

        match unit.stock.checked_sub(quantity) {
            Some(remaining) => {
                unit.stock = remaining;
                record_reservation("reserved");
                tracing::debug!(%variant_id, quantity, remaining, "stock reserved");
                Ok(true)
            }
            None => {
                record_reservation("insufficient");
                tracing::debug!(%variant_id, quantity, stock = unit.stock, "insufficient stock");
                Ok(false)
            }
        }
    }

    #[tracing::instrument(skip(self))]
    async fn release(&self, variant_id: VariantId, quantity: u32) {
        let mut units = self.units.lock().await;
        match units.get_mut(&variant_id) {
            Some(unit) => {
                unit.stock = unit.stock.saturating_add(quantity);
                tracing::debug!(%variant_id, quantity, stock = unit.stock, "stock released");
            }
            None => {
                record_release_failure();
                tracing::error!(%variant_id, quantity, "cannot release stock for unknown variant");
            }
        }
    }

    async fn check_availability(
        &self,
        variant_id: VariantId,
        quantity: u32,
    ) -> Result<Availability> {
        let units = self.units.lock().await;
        let unit = units
            .get(&variant_id)
            .ok_or(LedgerError::NotFound(variant_id))?;
        Ok(Availability::of(unit.stock, unit.is_active, quantity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProductId;

    const TIMEOUT: Duration = Duration::from_millis(200);

    fn ledger_with(stock: u32) -> (InMemoryInventoryLedger, VariantId) {
        let variant_id = VariantId::new();
        let ledger = InMemoryInventoryLedger::with_units([InventoryUnit::new(
            variant_id,
            ProductId::new(),
            "SKU-001",
            stock,
        )]);
        (ledger, variant_id)
    }

    #[tokio::test]
    async fn reserve_decrements_stock() {
        let (ledger, id) = ledger_with(10);

        assert!(ledger.reserve(id, 4, TIMEOUT).await.unwrap());
        assert_eq!(ledger.stock_of(id).await, Some(6));
    }

    #[tokio::test]
    async fn reserve_exact_stock_succeeds() {
        let (ledger, id) = ledger_with(3);

        assert!(ledger.reserve(id, 3, TIMEOUT).await.unwrap());
        assert_eq!(ledger.stock_of(id).await, Some(0));
    }

    #[tokio::test]
    async fn insufficient_stock_returns_false_without_change() {
        let (ledger, id) = ledger_with(2);

        assert!(!ledger.reserve(id, 3, TIMEOUT).await.unwrap());
        assert_eq!(ledger.stock_of(id).await, Some(2));
    }

    #[tokio::test]
    async fn unknown_variant_is_not_found() {
        let ledger = InMemoryInventoryLedger::new();
        let missing = VariantId::new();

        let err = ledger.reserve(missing, 1, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn inactive_variant_is_rejected() {
        let (ledger, id) = ledger_with(10);
        ledger.set_active(id, false).await;

        let err = ledger.reserve(id, 1, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, LedgerError::Inactive { ref sku, .. } if sku == "SKU-001"));
        assert_eq!(ledger.stock_of(id).await, Some(10));
    }

    #[tokio::test]
    async fn release_restores_reserved_stock() {
        let (ledger, id) = ledger_with(5);

        assert!(ledger.reserve(id, 5, TIMEOUT).await.unwrap());
        ledger.release(id, 5).await;
        assert_eq!(ledger.stock_of(id).await, Some(5));
    }

    #[tokio::test]
    async fn release_of_unknown_variant_is_swallowed() {
        let ledger = InMemoryInventoryLedger::new();
        ledger.release(VariantId::new(), 3).await;
    }

    #[tokio::test]
    async fn reserve_times_out_under_contention() {
        let (ledger, id) = ledger_with(5);
        let _held = ledger.units.lock().await;

        let reserved = ledger
            .reserve(id, 1, Duration::from_millis(20))
            .await
            .unwrap();
        assert!(!reserved);
    }

    #[tokio::test]
    async fn check_availability_reports_stock() {
        let (ledger, id) = ledger_with(5);

        let availability = ledger.check_availability(id, 6).await.unwrap();
        assert!(!availability.available);
        assert_eq!(availability.current_stock, 5);

        let availability = ledger.check_availability(id, 5).await.unwrap();
        assert!(availability.available);
    }
}
