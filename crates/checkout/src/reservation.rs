//! Stock reservations held by a single checkout.

use std::sync::Arc;

use common::VariantId;
use inventory::InventoryLedger;

/// One successful `reserve` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub variant_id: VariantId,
    pub quantity: u32,
}

/// Reservations acquired so far by one checkout, in acquisition order.
///
/// Each reservation was committed by the ledger on its own. They are handed
/// back by [`ReservationSet::release_all`], or kept for good by
/// [`ReservationSet::commit`] once the order owns them. A set dropped while
/// still holding stock (the checkout future was cancelled mid-flight)
/// releases it on a spawned task.
pub struct ReservationSet {
    ledger: Arc<dyn InventoryLedger>,
    held: Vec<Reservation>,
}

impl ReservationSet {
    pub fn new(ledger: Arc<dyn InventoryLedger>) -> Self {
        Self {
            ledger,
            held: Vec::new(),
        }
    }

    pub fn push(&mut self, variant_id: VariantId, quantity: u32) {
        self.held.push(Reservation {
            variant_id,
            quantity,
        });
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reservation> {
        self.held.iter()
    }

    /// Returns every held unit to the ledger, most recent first.
    pub async fn release_all(&mut self) {
        let count = self.held.len();
        release(self.ledger.as_ref(), std::mem::take(&mut self.held)).await;
        if count > 0 {
            tracing::info!(count, "released reservations");
        }
    }

    /// Hands the held stock over to a durably placed order.
    pub fn commit(mut self) {
        self.held.clear();
    }
}

impl std::fmt::Debug for ReservationSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservationSet")
            .field("held", &self.held)
            .finish_non_exhaustive()
    }
}

impl Drop for ReservationSet {
    fn drop(&mut self) {
        if self.held.is_empty() {
            return;
        }

        let held = std::mem::take(&mut self.held);
        let count = held.len();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!(count, "checkout abandoned, releasing reservations");
                let ledger = Arc::clone(&self.ledger);
                handle.spawn(async move {
                    release(ledger.as_ref(), held).await;
                });
            }
            Err(_) => {
                metrics::counter!("inventory_release_failures_total").increment(count as u64);
                tracing::error!(count, "no runtime to release abandoned reservations");
            }
        }
    }
}

async fn release(ledger: &dyn InventoryLedger, held: Vec<Reservation>) {
    for reservation in held.into_iter().rev() {
        ledger
            .release(reservation.variant_id, reservation.quantity)
            .await;
    }
}
