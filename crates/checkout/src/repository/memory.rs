//! In-memory store backing every repository seam.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{AddressId, OrderId, ProductId, UserId};
use domain::{Coupon, Order, PaymentRecord, TrackingUpdate};

use super::{
    Address, AddressBook, CartItem, CartStore, CouponDirectory, OrderPlacement, OrderRepository,
    RepositoryError, Result,
};

#[derive(Debug, Default)]
struct StoreState {
    addresses: HashMap<AddressId, Address>,
    carts: HashMap<UserId, Vec<CartItem>>,
    coupons: HashMap<String, Coupon>,
    sold_counts: HashMap<ProductId, u64>,
    orders: HashMap<OrderId, Order>,
    payments: HashMap<OrderId, PaymentRecord>,
    tracking: HashMap<OrderId, Vec<TrackingUpdate>>,
    fail_on_place_order: bool,
    fail_on_save_status: bool,
}

/// In-memory implementation of the order repository and its collaborators.
///
/// All tables live behind one lock, so each unit of work is applied
/// atomically: every precondition is checked before the first write.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_address(&self, address: Address) {
        self.state
            .write()
            .unwrap()
            .addresses
            .insert(address.id, address);
    }

    /// Appends a line to the user's cart.
    pub fn add_to_cart(&self, user_id: UserId, item: CartItem) {
        self.state
            .write()
            .unwrap()
            .carts
            .entry(user_id)
            .or_default()
            .push(item);
    }

    pub fn cart(&self, user_id: UserId) -> Vec<CartItem> {
        self.state
            .read()
            .unwrap()
            .carts
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn add_coupon(&self, coupon: Coupon) {
        self.state
            .write()
            .unwrap()
            .coupons
            .insert(coupon.code.clone(), coupon);
    }

    pub fn coupon(&self, code: &str) -> Option<Coupon> {
        self.state.read().unwrap().coupons.get(code).cloned()
    }

    pub fn sold_count(&self, product_id: ProductId) -> u64 {
        self.state
            .read()
            .unwrap()
            .sold_counts
            .get(&product_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn order_count(&self) -> usize {
        self.state.read().unwrap().orders.len()
    }

    /// Makes every following `place_order` fail as if the database were down.
    pub fn set_fail_on_place_order(&self, fail: bool) {
        self.state.write().unwrap().fail_on_place_order = fail;
    }

    /// Makes every following `save_status` fail as if the database were down.
    pub fn set_fail_on_save_status(&self, fail: bool) {
        self.state.write().unwrap().fail_on_save_status = fail;
    }
}

#[async_trait]
impl AddressBook for InMemoryStore {
    async fn find_address(
        &self,
        user_id: UserId,
        address_id: AddressId,
    ) -> Result<Option<Address>> {
        Ok(self
            .state
            .read()
            .unwrap()
            .addresses
            .get(&address_id)
            .filter(|address| address.user_id == user_id)
            .cloned())
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn load_cart(&self, user_id: UserId) -> Result<Vec<CartItem>> {
        Ok(self.cart(user_id))
    }
}

#[async_trait]
impl CouponDirectory for InMemoryStore {
    async fn find_coupon(&self, code: &str) -> Result<Option<Coupon>> {
        Ok(self.coupon(code))
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    #[tracing::instrument(
        skip(self, placement),
        fields(order_number = %placement.order.order_number)
    )]
    async fn place_order(&self, placement: &OrderPlacement) -> Result<()> {
        let mut state = self.state.write().unwrap();
        let order = &placement.order;

        if state.fail_on_place_order {
            return Err(RepositoryError::Unavailable(
                "simulated write failure".to_string(),
            ));
        }
        if state.orders.contains_key(&order.id) {
            return Err(RepositoryError::Unavailable(format!(
                "duplicate order {}",
                order.id
            )));
        }
        if let Some(code) = &order.coupon_code {
            let coupon = state
                .coupons
                .get(code)
                .ok_or_else(|| RepositoryError::CouponExhausted(code.clone()))?;
            if !coupon.has_uses_left() {
                return Err(RepositoryError::CouponExhausted(code.clone()));
            }
        }

        if let Some(coupon) = order
            .coupon_code
            .as_ref()
            .and_then(|code| state.coupons.get_mut(code))
        {
            coupon.usage_count += 1;
        }
        for (product_id, sold) in placement.sold_per_product() {
            *state.sold_counts.entry(product_id).or_default() += sold;
        }
        state.carts.remove(&order.user_id);
        state
            .payments
            .insert(order.id, placement.payment.clone());
        state
            .tracking
            .insert(order.id, vec![placement.tracking.clone()]);
        state.orders.insert(order.id, order.clone());

        Ok(())
    }

    #[tracing::instrument(
        skip(self, order, tracking),
        fields(order_id = %order.id, status = %order.status)
    )]
    async fn save_status(
        &self,
        order: &Order,
        expected_version: i64,
        tracking: &TrackingUpdate,
    ) -> Result<()> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_save_status {
            return Err(RepositoryError::Unavailable(
                "simulated write failure".to_string(),
            ));
        }

        let stored = state
            .orders
            .get_mut(&order.id)
            .ok_or(RepositoryError::OrderNotFound(order.id))?;
        if stored.version != expected_version {
            return Err(RepositoryError::ConcurrencyConflict {
                order_id: order.id,
                expected: expected_version,
            });
        }

        *stored = order.clone();
        state
            .tracking
            .entry(order.id)
            .or_default()
            .push(tracking.clone());
        Ok(())
    }

    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().unwrap().orders.get(&order_id).cloned())
    }

    async fn tracking_history(&self, order_id: OrderId) -> Result<Vec<TrackingUpdate>> {
        Ok(self
            .state
            .read()
            .unwrap()
            .tracking
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn payment_for(&self, order_id: OrderId) -> Result<Option<PaymentRecord>> {
        Ok(self.state.read().unwrap().payments.get(&order_id).cloned())
    }
}
