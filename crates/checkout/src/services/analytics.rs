//! Product analytics events.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::UserId;
use domain::Order;
use serde::Serialize;
use serde_json::json;

use super::ServiceError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsEvent {
    pub name: &'static str,
    pub user_id: UserId,
    pub properties: serde_json::Value,
}

impl AnalyticsEvent {
    pub fn order_created(order: &Order) -> Self {
        Self {
            name: "order_created",
            user_id: order.user_id,
            properties: json!({
                "order_id": order.id,
                "order_number": order.order_number,
                "total": order.totals.total,
                "discount": order.totals.discount,
                "coupon_code": order.coupon_code,
                "item_count": order.item_count(),
            }),
        }
    }

    pub fn order_cancelled(order: &Order) -> Self {
        Self {
            name: "order_cancelled",
            user_id: order.user_id,
            properties: json!({
                "order_id": order.id,
                "order_number": order.order_number,
                "total": order.totals.total,
                "reason": order.cancellation_reason,
            }),
        }
    }
}

#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn track(&self, event: &AnalyticsEvent) -> Result<(), ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryAnalyticsState {
    events: Vec<AnalyticsEvent>,
    fail_on_track: bool,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryAnalytics {
    state: Arc<RwLock<InMemoryAnalyticsState>>,
}

impl InMemoryAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_track(&self, fail: bool) {
        self.state.write().unwrap().fail_on_track = fail;
    }

    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.state.read().unwrap().events.clone()
    }
}

#[async_trait]
impl AnalyticsSink for InMemoryAnalytics {
    async fn track(&self, event: &AnalyticsEvent) -> Result<(), ServiceError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_track {
            return Err(ServiceError::unavailable("analytics", "event dropped"));
        }
        tracing::debug!(event = event.name, user_id = %event.user_id, "analytics event");
        state.events.push(event.clone());
        Ok(())
    }
}
