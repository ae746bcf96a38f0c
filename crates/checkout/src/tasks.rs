//! Outbound side effects that run after the response is decided.
//!
//! The orchestrator only enqueues; a [`TaskWorker`] delivers. Delivery
//! failures are logged and counted and never reach the caller.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::services::{AnalyticsEvent, AnalyticsSink, AuditEntry, AuditLog, Notification, Notifier};

#[derive(Debug, Clone)]
pub enum OutboundTask {
    Notify(Notification),
    Audit(AuditEntry),
    Track(AnalyticsEvent),
}

impl OutboundTask {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundTask::Notify(_) => "notification",
            OutboundTask::Audit(_) => "audit_log",
            OutboundTask::Track(_) => "analytics",
        }
    }
}

/// Sending half of the outbound task channel.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<OutboundTask>,
}

impl TaskQueue {
    /// Creates a queue and the receiver a [`TaskWorker`] drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueues a task. Never fails; a closed queue drops the task with a warning.
    pub fn enqueue(&self, task: OutboundTask) {
        let kind = task.kind();
        if self.tx.send(task).is_err() {
            metrics::counter!("outbound_tasks_total", "kind" => kind, "outcome" => "dropped")
                .increment(1);
            tracing::warn!(kind, "outbound task queue closed, task dropped");
        }
    }
}

/// Drains the task queue and delivers each task to its collaborator.
pub struct TaskWorker {
    rx: mpsc::UnboundedReceiver<OutboundTask>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditLog>,
    analytics: Arc<dyn AnalyticsSink>,
}

impl TaskWorker {
    pub fn new(
        rx: mpsc::UnboundedReceiver<OutboundTask>,
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditLog>,
        analytics: Arc<dyn AnalyticsSink>,
    ) -> Self {
        Self {
            rx,
            notifier,
            audit,
            analytics,
        }
    }

    /// Runs until every [`TaskQueue`] handle has been dropped.
    pub async fn run(mut self) {
        while let Some(task) = self.rx.recv().await {
            self.dispatch(task).await;
        }
        tracing::debug!("outbound task worker stopped");
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn dispatch(&self, task: OutboundTask) {
        let kind = task.kind();
        let result = match &task {
            OutboundTask::Notify(notification) => self.notifier.send(notification).await,
            OutboundTask::Audit(entry) => self.audit.record(entry).await,
            OutboundTask::Track(event) => self.analytics.track(event).await,
        };

        match result {
            Ok(()) => {
                metrics::counter!("outbound_tasks_total", "kind" => kind, "outcome" => "delivered")
                    .increment(1);
            }
            Err(e) => {
                metrics::counter!("outbound_tasks_total", "kind" => kind, "outcome" => "failed")
                    .increment(1);
                tracing::warn!(kind, error = %e, "outbound task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{InMemoryAnalytics, InMemoryAuditLog, InMemoryNotifier};
    use common::{OrderId, UserId};
    use serde_json::json;

    fn worker(
        rx: mpsc::UnboundedReceiver<OutboundTask>,
    ) -> (TaskWorker, InMemoryNotifier, InMemoryAnalytics) {
        let notifier = InMemoryNotifier::new();
        let analytics = InMemoryAnalytics::new();
        let worker = TaskWorker::new(
            rx,
            Arc::new(notifier.clone()),
            Arc::new(InMemoryAuditLog::new()),
            Arc::new(analytics.clone()),
        );
        (worker, notifier, analytics)
    }

    fn confirmation() -> Notification {
        Notification::OrderConfirmation {
            user_id: UserId::new(),
            order_id: OrderId::new(),
            order_number: "ORD-1-00000000".into(),
            total: domain::Money::from_major(10),
        }
    }

    #[tokio::test]
    async fn worker_delivers_until_queue_closes() {
        let (queue, rx) = TaskQueue::channel();
        let (worker, notifier, analytics) = worker(rx);
        let handle = worker.spawn();

        queue.enqueue(OutboundTask::Notify(confirmation()));
        queue.enqueue(OutboundTask::Track(AnalyticsEvent {
            name: "order_created",
            user_id: UserId::new(),
            properties: json!({}),
        }));
        drop(queue);
        handle.await.unwrap();

        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(analytics.events().len(), 1);
    }

    #[tokio::test]
    async fn failed_delivery_does_not_stop_the_worker() {
        let (queue, rx) = TaskQueue::channel();
        let (worker, notifier, _) = worker(rx);
        notifier.set_fail_on_send(true);
        let handle = worker.spawn();

        queue.enqueue(OutboundTask::Notify(confirmation()));
        queue.enqueue(OutboundTask::Notify(confirmation()));
        drop(queue);
        handle.await.unwrap();

        assert!(notifier.sent().is_empty());
    }

    #[test]
    fn enqueue_on_closed_queue_is_silent() {
        let (queue, rx) = TaskQueue::channel();
        drop(rx);
        queue.enqueue(OutboundTask::Notify(confirmation()));
    }
}
