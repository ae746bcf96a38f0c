//! Order orchestrator: the checkout and cancellation pipelines.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use common::{AddressId, OrderId, UserId, VariantId};
use domain::{
    CouponLookup, NewOrder, Order, OrderLineItem, OrderStatus, PaymentMethod, PricingEngine,
    TrackingUpdate, generate_order_number,
};
use inventory::{Availability, DEFAULT_RESERVE_TIMEOUT, InventoryLedger};
use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, Result};
use crate::repository::{
    AddressBook, CartItem, CartStore, CouponDirectory, OrderPlacement, OrderRepository,
};
use crate::reservation::ReservationSet;
use crate::services::{AnalyticsEvent, AuditAction, AuditEntry, AuditLog, Notification};
use crate::tasks::{OutboundTask, TaskQueue};

/// Input to [`OrderOrchestrator::create_order`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: UserId,
    pub shipping_address_id: AddressId,
    pub billing_address_id: AddressId,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Read-side collaborators and the synchronous audit log.
#[derive(Clone)]
pub struct Collaborators {
    pub addresses: Arc<dyn AddressBook>,
    pub carts: Arc<dyn CartStore>,
    pub coupons: Arc<dyn CouponDirectory>,
    pub audit: Arc<dyn AuditLog>,
}

/// Drives order creation and lifecycle changes.
///
/// Stock is reserved through the ledger one line at a time, each reservation
/// committing on its own. Anything that fails after the first reservation
/// releases the acquired set before the error is returned. A checkout whose
/// future is dropped before the order is placed releases it in the background.
pub struct OrderOrchestrator<L, R>
where
    L: InventoryLedger,
    R: OrderRepository,
{
    ledger: Arc<L>,
    orders: R,
    collaborators: Collaborators,
    tasks: TaskQueue,
    pricing: PricingEngine,
    reservation_timeout: Duration,
}

impl<L, R> OrderOrchestrator<L, R>
where
    L: InventoryLedger + 'static,
    R: OrderRepository,
{
    pub fn new(ledger: L, orders: R, collaborators: Collaborators, tasks: TaskQueue) -> Self {
        Self {
            ledger: Arc::new(ledger),
            orders,
            collaborators,
            tasks,
            pricing: PricingEngine::default(),
            reservation_timeout: DEFAULT_RESERVE_TIMEOUT,
        }
    }

    pub fn with_pricing(mut self, pricing: PricingEngine) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_reservation_timeout(mut self, timeout: Duration) -> Self {
        self.reservation_timeout = timeout;
        self
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn orders(&self) -> &R {
        &self.orders
    }

    /// Turns the user's cart into a `Pending` order.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<Order> {
        metrics::counter!("checkout_attempts_total").increment(1);
        let started = Instant::now();

        let result = self.checkout(request).await;

        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        match &result {
            Ok(order) => {
                metrics::counter!("checkout_completed_total").increment(1);
                tracing::info!(
                    order_id = %order.id,
                    order_number = %order.order_number,
                    total = %order.totals.total,
                    "order created"
                );
            }
            Err(e) => {
                metrics::counter!("checkout_failed_total", "reason" => e.kind().as_str())
                    .increment(1);
                tracing::warn!(error = %e, "checkout failed");
            }
        }
        result
    }

    async fn checkout(&self, request: CreateOrderRequest) -> Result<Order> {
        let user_id = request.user_id;
        let addresses = &self.collaborators.addresses;

        addresses
            .find_address(user_id, request.shipping_address_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound("Shipping address not found".into()))?;
        addresses
            .find_address(user_id, request.billing_address_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound("Billing address not found".into()))?;

        let cart = self.collaborators.carts.load_cart(user_id).await?;
        if cart.is_empty() {
            return Err(CheckoutError::Validation("Cart is empty".into()));
        }

        let mut reservations = ReservationSet::new(self.ledger.clone());
        let order = match self.reserve_and_place(&request, &cart, &mut reservations).await {
            Ok(order) => {
                reservations.commit();
                order
            }
            Err(e) => {
                reservations.release_all().await;
                return Err(e);
            }
        };

        self.tasks
            .enqueue(OutboundTask::Notify(Notification::order_confirmation(&order)));
        self.tasks.enqueue(OutboundTask::Audit(AuditEntry::new(
            AuditAction::OrderCreated,
            &order,
            Some(user_id),
            format!("total {}", order.totals.total),
        )));
        self.tasks
            .enqueue(OutboundTask::Track(AnalyticsEvent::order_created(&order)));

        Ok(order)
    }

    async fn reserve_and_place(
        &self,
        request: &CreateOrderRequest,
        cart: &[CartItem],
        reservations: &mut ReservationSet,
    ) -> Result<Order> {
        let mut lines = Vec::with_capacity(cart.len());

        for item in cart {
            if !item.is_active {
                return Err(CheckoutError::Validation(format!(
                    "Product {} is no longer available",
                    item.sku
                )));
            }
            if item.quantity == 0 {
                return Err(CheckoutError::Validation(format!(
                    "Invalid quantity for {}",
                    item.sku
                )));
            }

            let reserved = self
                .ledger
                .reserve(item.variant_id, item.quantity, self.reservation_timeout)
                .await?;
            if !reserved {
                return Err(CheckoutError::Validation(format!(
                    "Insufficient stock for {}",
                    item.sku
                )));
            }
            reservations.push(item.variant_id, item.quantity);

            lines.push(OrderLineItem::new(
                item.variant_id,
                item.product_id,
                item.sku.clone(),
                item.name.clone(),
                item.quantity,
                item.unit_price,
            ));
        }
        tracing::debug!(lines = lines.len(), "stock reserved for cart");

        let coupon = match &request.coupon_code {
            Some(code) => Some(
                match self.collaborators.coupons.find_coupon(code).await? {
                    Some(coupon) => CouponLookup::Found(coupon),
                    None => CouponLookup::Missing(code.clone()),
                },
            ),
            None => None,
        };

        let now = Utc::now();
        let quote = self.pricing.quote(&lines, coupon.as_ref(), now)?;

        let order = Order::place(
            NewOrder {
                order_number: generate_order_number(now),
                user_id: request.user_id,
                items: lines,
                totals: quote.totals,
                coupon_code: quote.coupon_code,
                shipping_address_id: request.shipping_address_id,
                billing_address_id: request.billing_address_id,
                payment_method: request.payment_method,
                notes: request.notes.clone(),
            },
            now,
        );

        let placement = OrderPlacement::new(order, now);
        self.orders.place_order(&placement).await?;
        Ok(placement.order)
    }

    /// Cancels one of the user's orders and returns its stock.
    ///
    /// Cancelling an already cancelled order returns it unchanged.
    #[tracing::instrument(skip(self, reason))]
    pub async fn cancel_order(
        &self,
        order_id: OrderId,
        user_id: UserId,
        reason: Option<String>,
    ) -> Result<Order> {
        let mut order = self
            .orders
            .find_order_for_user(order_id, user_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound("Order not found".into()))?;

        if order.status == OrderStatus::Cancelled {
            return Ok(order);
        }

        let expected_version = order.version;
        let now = Utc::now();
        order.transition(OrderStatus::Cancelled, reason.as_deref(), now)?;

        let note = reason.as_deref().unwrap_or("Order cancelled by customer");
        let tracking = TrackingUpdate::new(order.id, OrderStatus::Cancelled, note, now);
        self.orders
            .save_status(&order, expected_version, &tracking)
            .await?;

        self.restore_inventory(&order).await;
        metrics::counter!("order_cancellations_total").increment(1);
        tracing::info!(order_number = %order.order_number, "order cancelled");

        self.record_audit(AuditEntry::new(
            AuditAction::OrderCancelled,
            &order,
            Some(user_id),
            note,
        ))
        .await;
        self.tasks
            .enqueue(OutboundTask::Track(AnalyticsEvent::order_cancelled(&order)));

        Ok(order)
    }

    /// Moves an order along its lifecycle on behalf of the back office.
    ///
    /// A transition to `Cancelled` returns stock like [`Self::cancel_order`].
    #[tracing::instrument(skip(self, note))]
    pub async fn advance_status(
        &self,
        order_id: OrderId,
        to: OrderStatus,
        note: Option<String>,
    ) -> Result<Order> {
        let mut order = self
            .orders
            .find_order(order_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound("Order not found".into()))?;

        if order.status == to {
            return Ok(order);
        }

        let from = order.status;
        let expected_version = order.version;
        let now = Utc::now();
        order.transition(to, note.as_deref(), now)?;

        let note = note.unwrap_or_else(|| format!("Status changed from {from} to {to}"));
        let tracking = TrackingUpdate::new(order.id, to, note.clone(), now);
        self.orders
            .save_status(&order, expected_version, &tracking)
            .await?;

        if to == OrderStatus::Cancelled {
            self.restore_inventory(&order).await;
            metrics::counter!("order_cancellations_total").increment(1);
        }
        tracing::info!(order_number = %order.order_number, %from, %to, "order status changed");

        self.tasks
            .enqueue(OutboundTask::Notify(Notification::status_changed(&order)));
        self.tasks.enqueue(OutboundTask::Audit(AuditEntry::new(
            AuditAction::StatusChanged,
            &order,
            None,
            note,
        )));

        Ok(order)
    }

    pub async fn get_order(&self, order_id: OrderId, user_id: UserId) -> Result<Order> {
        self.orders
            .find_order_for_user(order_id, user_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound("Order not found".into()))
    }

    /// Status history of one of the user's orders, oldest first.
    pub async fn tracking_history(
        &self,
        order_id: OrderId,
        user_id: UserId,
    ) -> Result<Vec<TrackingUpdate>> {
        let order = self.get_order(order_id, user_id).await?;
        Ok(self.orders.tracking_history(order.id).await?)
    }

    /// Non-locking stock check for display.
    pub async fn check_availability(
        &self,
        variant_id: VariantId,
        quantity: u32,
    ) -> Result<Availability> {
        Ok(self.ledger.check_availability(variant_id, quantity).await?)
    }

    async fn restore_inventory(&self, order: &Order) {
        for item in &order.items {
            self.ledger.release(item.variant_id, item.quantity).await;
        }
    }

    async fn record_audit(&self, entry: AuditEntry) {
        if let Err(e) = self.collaborators.audit.record(&entry).await {
            metrics::counter!("audit_log_failures_total").increment(1);
            tracing::error!(
                action = entry.action.as_str(),
                order_id = %entry.order_id,
                error = %e,
                "failed to write audit entry"
            );
        }
    }
}
