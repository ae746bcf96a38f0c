//! Customer notifications.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{OrderId, UserId};
use domain::{Money, Order, OrderStatus};
use serde::Serialize;

use super::ServiceError;

/// A message to the customer about one of their orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Notification {
    OrderConfirmation {
        user_id: UserId,
        order_id: OrderId,
        order_number: String,
        total: Money,
    },
    StatusChanged {
        user_id: UserId,
        order_id: OrderId,
        order_number: String,
        status: OrderStatus,
    },
}

impl Notification {
    pub fn order_confirmation(order: &Order) -> Self {
        Notification::OrderConfirmation {
            user_id: order.user_id,
            order_id: order.id,
            order_number: order.order_number.clone(),
            total: order.totals.total,
        }
    }

    pub fn status_changed(order: &Order) -> Self {
        Notification::StatusChanged {
            user_id: order.user_id,
            order_id: order.id,
            order_number: order.order_number.clone(),
            status: order.status,
        }
    }

    pub fn user_id(&self) -> UserId {
        match self {
            Notification::OrderConfirmation { user_id, .. }
            | Notification::StatusChanged { user_id, .. } => *user_id,
        }
    }
}

/// Delivers notifications to customers.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<Notification>,
    fail_on_send: bool,
}

/// Notifier that records what it was asked to send.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to fail every send.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.state.read().unwrap().sent.clone()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), ServiceError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_send {
            return Err(ServiceError::unavailable("notifier", "send rejected"));
        }
        tracing::info!(user_id = %notification.user_id(), ?notification, "notification sent");
        state.sent.push(notification.clone());
        Ok(())
    }
}
