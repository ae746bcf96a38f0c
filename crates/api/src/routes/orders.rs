//! Checkout, order lifecycle and inventory endpoints.

use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use checkout::{CreateOrderRequest, OrderOrchestrator, OrderRepository};
use chrono::{DateTime, Utc};
use common::{OrderId, UserId, VariantId};
use domain::{Order, OrderLineItem, OrderStatus, TrackingUpdate};
use inventory::InventoryLedger;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<L: InventoryLedger, R: OrderRepository> {
    pub orchestrator: Arc<OrderOrchestrator<L, R>>,
}

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CancelOrderRequest {
    pub user_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub status: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

// -- Response types --

/// Money fields are rendered with exactly two decimal places.
#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub order_number: String,
    pub user_id: String,
    pub status: String,
    pub version: i64,
    pub items: Vec<OrderItemResponse>,
    pub subtotal: String,
    pub discount: String,
    pub tax: String,
    pub shipping_cost: String,
    pub total: String,
    pub coupon_code: Option<String>,
    pub payment_method: String,
    pub shipping_address_id: String,
    pub billing_address_id: String,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub variant_id: String,
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: String,
    pub subtotal: String,
}

#[derive(Serialize)]
pub struct TrackingResponse {
    pub status: String,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct AvailabilityResponse {
    pub variant_id: String,
    pub quantity: u32,
    pub available: bool,
    pub current_stock: u32,
}

impl From<&OrderLineItem> for OrderItemResponse {
    fn from(item: &OrderLineItem) -> Self {
        Self {
            variant_id: item.variant_id.to_string(),
            product_id: item.product_id.to_string(),
            sku: item.sku.clone(),
            name: item.name.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price.to_string(),
            subtotal: item.subtotal.to_string(),
        }
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        let totals = order.totals;
        Self {
            id: order.id.to_string(),
            user_id: order.user_id.to_string(),
            status: order.status.to_string(),
            version: order.version,
            items: order.items.iter().map(OrderItemResponse::from).collect(),
            subtotal: totals.subtotal.to_string(),
            discount: totals.discount.to_string(),
            tax: totals.tax.to_string(),
            shipping_cost: totals.shipping_cost.to_string(),
            total: totals.total.to_string(),
            payment_method: order.payment_method.to_string(),
            shipping_address_id: order.shipping_address_id.to_string(),
            billing_address_id: order.billing_address_id.to_string(),
            order_number: order.order_number,
            coupon_code: order.coupon_code,
            notes: order.notes,
            cancellation_reason: order.cancellation_reason,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

impl From<TrackingUpdate> for TrackingResponse {
    fn from(update: TrackingUpdate) -> Self {
        Self {
            status: update.status.to_string(),
            note: update.note,
            created_at: update.created_at,
        }
    }
}

// -- Handlers --

/// POST /checkout: turn the user's cart into a pending order.
///
/// The checkout runs on its own task, so a client that disconnects mid-way
/// does not cancel it between reserving stock and placing the order.
#[tracing::instrument(skip(state, req))]
pub async fn checkout<L, R>(
    State(state): State<Arc<AppState<L, R>>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError>
where
    L: InventoryLedger + 'static,
    R: OrderRepository + 'static,
{
    let orchestrator = Arc::clone(&state.orchestrator);
    let order = tokio::spawn(async move { orchestrator.create_order(req).await })
        .await
        .map_err(|e| ApiError::Internal(format!("checkout task failed: {e}")))??;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// POST /orders/:id/cancel: cancel one of the user's orders.
#[tracing::instrument(skip(state, req))]
pub async fn cancel<L, R>(
    State(state): State<Arc<AppState<L, R>>>,
    Path(id): Path<String>,
    Json(req): Json<CancelOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError>
where
    L: InventoryLedger + 'static,
    R: OrderRepository + 'static,
{
    let order_id: OrderId = parse_id(&id, "order id")?;
    let user_id: UserId = parse_id(&req.user_id, "user_id")?;

    let order = state
        .orchestrator
        .cancel_order(order_id, user_id, req.reason)
        .await?;
    Ok(Json(order.into()))
}

/// GET /orders/:id?user_id=: load one of the user's orders.
#[tracing::instrument(skip(state))]
pub async fn get<L, R>(
    State(state): State<Arc<AppState<L, R>>>,
    Path(id): Path<String>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<OrderResponse>, ApiError>
where
    L: InventoryLedger + 'static,
    R: OrderRepository + 'static,
{
    let order_id: OrderId = parse_id(&id, "order id")?;
    let user_id: UserId = parse_id(&query.user_id, "user_id")?;

    let order = state.orchestrator.get_order(order_id, user_id).await?;
    Ok(Json(order.into()))
}

/// GET /orders/:id/tracking?user_id=: status history, oldest first.
#[tracing::instrument(skip(state))]
pub async fn tracking<L, R>(
    State(state): State<Arc<AppState<L, R>>>,
    Path(id): Path<String>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<Vec<TrackingResponse>>, ApiError>
where
    L: InventoryLedger + 'static,
    R: OrderRepository + 'static,
{
    let order_id: OrderId = parse_id(&id, "order id")?;
    let user_id: UserId = parse_id(&query.user_id, "user_id")?;

    let history = state
        .orchestrator
        .tracking_history(order_id, user_id)
        .await?;
    Ok(Json(history.into_iter().map(TrackingResponse::from).collect()))
}

/// POST /orders/:id/status: back-office status change.
#[tracing::instrument(skip(state, req))]
pub async fn advance_status<L, R>(
    State(state): State<Arc<AppState<L, R>>>,
    Path(id): Path<String>,
    Json(req): Json<StatusChangeRequest>,
) -> Result<Json<OrderResponse>, ApiError>
where
    L: InventoryLedger + 'static,
    R: OrderRepository + 'static,
{
    let order_id: OrderId = parse_id(&id, "order id")?;
    let status = OrderStatus::from_str(&req.status)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let order = state
        .orchestrator
        .advance_status(order_id, status, req.note)
        .await?;
    Ok(Json(order.into()))
}

/// GET /inventory/:variant_id/availability?quantity=: non-locking stock check.
#[tracing::instrument(skip(state))]
pub async fn availability<L, R>(
    State(state): State<Arc<AppState<L, R>>>,
    Path(variant_id): Path<String>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, ApiError>
where
    L: InventoryLedger + 'static,
    R: OrderRepository + 'static,
{
    let id: VariantId = parse_id(&variant_id, "variant id")?;
    let availability = state
        .orchestrator
        .check_availability(id, query.quantity)
        .await?;

    Ok(Json(AvailabilityResponse {
        variant_id: id.to_string(),
        quantity: query.quantity,
        available: availability.available,
        current_stock: availability.current_stock,
    }))
}

fn parse_id<T>(value: &str, field: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {field}: {e}")))
}
