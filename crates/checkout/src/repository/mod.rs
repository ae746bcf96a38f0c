//! Persistence seams: order repository and the collaborators the checkout reads.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AddressId, OrderId, ProductId, UserId, VariantId};
use domain::{
    Coupon, Money, Order, OrderStatus, PaymentRecord, TrackingUpdate, UnknownVariant,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Note attached to the first tracking row of every order.
pub const ORDER_PLACED_NOTE: &str = "Order placed";

/// Errors raised by repositories and the read-side collaborators.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored enum value is not recognised.
    #[error("Decode error: {0}")]
    Decode(#[from] UnknownVariant),

    /// A stored value is out of range for its in-memory type.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// The order's version moved on since it was read.
    #[error("Order {order_id} is no longer at version {expected}")]
    ConcurrencyConflict { order_id: OrderId, expected: i64 },

    /// The guarded usage increment found no uses left.
    #[error("Coupon {0} has no uses left")]
    CouponExhausted(String),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The backing store refused the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// A delivery or billing address owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub user_id: UserId,
    pub recipient: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

/// A cart line joined with the variant's current catalog data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub variant_id: VariantId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub is_active: bool,
}

/// Every row written when an order is placed.
#[derive(Debug, Clone)]
pub struct OrderPlacement {
    pub order: Order,
    pub payment: PaymentRecord,
    pub tracking: TrackingUpdate,
}

impl OrderPlacement {
    /// Builds the pending payment and the initial tracking row for `order`.
    pub fn new(order: Order, now: DateTime<Utc>) -> Self {
        let payment =
            PaymentRecord::pending(order.id, order.payment_method, order.totals.total, now);
        let tracking = TrackingUpdate::new(order.id, OrderStatus::Pending, ORDER_PLACED_NOTE, now);
        Self {
            order,
            payment,
            tracking,
        }
    }

    /// Units sold per product, for the sold counters.
    pub fn sold_per_product(&self) -> Vec<(ProductId, u64)> {
        let mut totals: Vec<(ProductId, u64)> = Vec::new();
        for item in &self.order.items {
            match totals.iter_mut().find(|(id, _)| *id == item.product_id) {
                Some((_, sold)) => *sold += u64::from(item.quantity),
                None => totals.push((item.product_id, u64::from(item.quantity))),
            }
        }
        totals
    }
}

/// Looks up a user's saved addresses.
#[async_trait]
pub trait AddressBook: Send + Sync {
    /// Returns the address only if it belongs to `user_id`.
    async fn find_address(&self, user_id: UserId, address_id: AddressId)
    -> Result<Option<Address>>;
}

/// Reads and clears shopping carts.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Returns the user's cart lines in the order they were added.
    async fn load_cart(&self, user_id: UserId) -> Result<Vec<CartItem>>;
}

/// Resolves coupon codes.
#[async_trait]
pub trait CouponDirectory: Send + Sync {
    async fn find_coupon(&self, code: &str) -> Result<Option<Coupon>>;
}

/// Durable storage for orders.
///
/// `place_order` and `save_status` are each a single unit of work: either
/// every row they describe is written, or none is.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Writes the order, its line items, payment and first tracking row,
    /// bumps product sold counters, increments coupon usage (failing with
    /// [`RepositoryError::CouponExhausted`] if none is left) and clears the
    /// user's cart.
    async fn place_order(&self, placement: &OrderPlacement) -> Result<()>;

    /// Persists a status change made by [`Order::transition`] together with
    /// its tracking row.
    ///
    /// Fails with [`RepositoryError::ConcurrencyConflict`] unless the stored
    /// order is still at `expected_version`.
    async fn save_status(
        &self,
        order: &Order,
        expected_version: i64,
        tracking: &TrackingUpdate,
    ) -> Result<()>;

    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Returns the order only if it belongs to `user_id`.
    async fn find_order_for_user(
        &self,
        order_id: OrderId,
        user_id: UserId,
    ) -> Result<Option<Order>> {
        Ok(self
            .find_order(order_id)
            .await?
            .filter(|order| order.user_id == user_id))
    }

    /// Status history, oldest first.
    async fn tracking_history(&self, order_id: OrderId) -> Result<Vec<TrackingUpdate>>;

    async fn payment_for(&self, order_id: OrderId) -> Result<Option<PaymentRecord>>;
}
