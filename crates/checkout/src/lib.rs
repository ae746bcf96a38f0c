//! Checkout orchestration for the order-creation pipeline.
//!
//! A checkout runs these steps, releasing reservations if any later step fails:
//! 1. Resolve addresses and load the cart
//! 2. Reserve stock line by line through the inventory ledger
//! 3. Price the order (coupon, tax, shipping)
//! 4. Persist order, payment, tracking, counters and cart clearing in one unit of work
//! 5. Enqueue notification, audit and analytics tasks

pub mod error;
pub mod orchestrator;
pub mod repository;
pub mod reservation;
pub mod services;
pub mod tasks;

pub use error::{CheckoutError, ErrorKind, Result};
pub use orchestrator::{Collaborators, CreateOrderRequest, OrderOrchestrator};
pub use repository::{
    Address, AddressBook, CartItem, CartStore, CouponDirectory, InMemoryStore, OrderPlacement,
    OrderRepository, PostgresStore, RepositoryError,
};
pub use reservation::{Reservation, ReservationSet};
pub use services::{
    AnalyticsEvent, AnalyticsSink, AuditAction, AuditEntry, AuditLog, InMemoryAnalytics,
    InMemoryAuditLog, InMemoryNotifier, Notification, Notifier, ServiceError,
};
pub use tasks::{OutboundTask, TaskQueue, TaskWorker};
