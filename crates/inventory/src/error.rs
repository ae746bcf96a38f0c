use thiserror::Error;

use crate::VariantId;

/// Structural failures of the inventory ledger.
///
/// Running out of stock is not an error: `reserve` reports it as `Ok(false)`.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The variant does not exist.
    #[error("Variant not found: {0}")]
    NotFound(VariantId),

    /// The variant exists but is not for sale.
    #[error("Variant {sku} ({variant_id}) is inactive")]
    Inactive { variant_id: VariantId, sku: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be represented in memory.
    #[error("Corrupt inventory row for {variant_id}: {reason}")]
    Corrupt { variant_id: VariantId, reason: String },
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
