//! Pure domain model for the order-creation pipeline.
//!
//! This crate holds no I/O:
//! - [`Money`], fixed-point currency amounts
//! - the order lifecycle state machine ([`OrderStatus`])
//! - the [`Order`] aggregate and its line items, payment and tracking records
//! - the pricing engine with coupon rules

pub mod error;
pub mod money;
pub mod order;
pub mod pricing;

pub use error::UnknownVariant;
pub use money::Money;
pub use order::{
    InvalidTransition, NewOrder, Order, OrderLineItem, OrderStatus, OrderTotals, PaymentMethod,
    PaymentRecord, PaymentStatus, TrackingUpdate, generate_order_number, is_valid_transition,
    validate_transition,
};
pub use pricing::{
    Coupon, CouponLookup, DiscountType, PricingEngine, PricingError, PricingPolicy, Quote,
};
