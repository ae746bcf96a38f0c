//! Audit trail of order mutations.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use domain::Order;
use serde::Serialize;

use super::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    OrderCreated,
    OrderCancelled,
    StatusChanged,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::OrderCreated => "ORDER_CREATED",
            AuditAction::OrderCancelled => "ORDER_CANCELLED",
            AuditAction::StatusChanged => "STATUS_CHANGED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub order_id: OrderId,
    pub order_number: String,
    /// The user who triggered the change; `None` for back-office actions.
    pub actor: Option<UserId>,
    pub detail: String,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        action: AuditAction,
        order: &Order,
        actor: Option<UserId>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            action,
            order_id: order.id,
            order_number: order.order_number.clone(),
            actor,
            detail: detail.into(),
            recorded_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, entry: &AuditEntry) -> Result<(), ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryAuditState {
    entries: Vec<AuditEntry>,
    fail_on_record: bool,
}

/// Audit log kept in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditLog {
    state: Arc<RwLock<InMemoryAuditState>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_record(&self, fail: bool) {
        self.state.write().unwrap().fail_on_record = fail;
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.state.read().unwrap().entries.clone()
    }

    /// Entries recorded for one order, oldest first.
    pub fn entries_for(&self, order_id: OrderId) -> Vec<AuditEntry> {
        self.state
            .read()
            .unwrap()
            .entries
            .iter()
            .filter(|entry| entry.order_id == order_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn record(&self, entry: &AuditEntry) -> Result<(), ServiceError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_record {
            return Err(ServiceError::unavailable("audit log", "write rejected"));
        }
        tracing::info!(
            action = entry.action.as_str(),
            order_id = %entry.order_id,
            detail = %entry.detail,
            "audit entry recorded"
        );
        state.entries.push(entry.clone());
        Ok(())
    }
}
