//! Fire-and-forget collaborators: notifications, audit log and analytics.

pub mod analytics;
pub mod audit;
pub mod notification;

pub use analytics::{AnalyticsEvent, AnalyticsSink, InMemoryAnalytics};
pub use audit::{AuditAction, AuditEntry, AuditLog, InMemoryAuditLog};
pub use notification::{InMemoryNotifier, Notification, Notifier};

use thiserror::Error;

/// Failure reported by an outbound collaborator.
#[derive(Debug, Clone, Error)]
#[error("{service} unavailable: {reason}")]
pub struct ServiceError {
    pub service: &'static str,
    pub reason: String,
}

impl ServiceError {
    pub fn unavailable(service: &'static str, reason: impl Into<String>) -> Self {
        Self {
            service,
            reason: reason.into(),
        }
    }
}
