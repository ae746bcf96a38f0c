//! Identifiers shared across the commerce crates.

pub mod types;

pub use types::{AddressId, OrderId, PaymentId, ProductId, UserId, VariantId};
