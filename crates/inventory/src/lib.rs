pub mod error;
pub mod ledger;
pub mod memory;
pub mod postgres;

pub use common::{ProductId, VariantId};
pub use error::{LedgerError, Result};
pub use ledger::{Availability, InventoryLedger, InventoryUnit, DEFAULT_RESERVE_TIMEOUT};
pub use memory::InMemoryInventoryLedger;
pub use postgres::PostgresInventoryLedger;
