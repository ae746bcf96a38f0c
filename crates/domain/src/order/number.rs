use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generates a human-readable order number: `ORD-<unix millis>-<8 hex>`.
///
/// The random suffix keeps numbers unique across orders placed in the same
/// millisecond; the database enforces uniqueness as well.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "ORD-{}-{}",
        now.timestamp_millis(),
        suffix[..8].to_ascii_uppercase()
    )
}
