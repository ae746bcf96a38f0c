//! Integration tests for the API server.

use std::sync::OnceLock;

use api::config::Config;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use checkout::{Address, CartItem, InMemoryStore};
use common::{AddressId, ProductId, UserId, VariantId};
use domain::{Coupon, Money};
use inventory::{InMemoryInventoryLedger, InventoryUnit};
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: Router,
    ledger: InMemoryInventoryLedger,
    store: InMemoryStore,
    user_id: UserId,
    address_id: AddressId,
    variant_id: VariantId,
}

impl TestApp {
    /// One customer with an address and a cart of 2 × 100.00, 10 in stock.
    async fn new() -> Self {
        let ledger = InMemoryInventoryLedger::new();
        let store = InMemoryStore::new();

        let user_id = UserId::new();
        let address_id = AddressId::new();
        store.add_address(Address {
            id: address_id,
            user_id,
            recipient: "Asha Rao".into(),
            line1: "12 MG Road".into(),
            line2: None,
            city: "Bengaluru".into(),
            state: "KA".into(),
            postal_code: "560001".into(),
            country: "IN".into(),
        });

        let product_id = ProductId::new();
        let variant_id = VariantId::new();
        ledger
            .insert_unit(InventoryUnit::new(variant_id, product_id, "TR-42-BLU", 10))
            .await;
        store.add_to_cart(
            user_id,
            CartItem {
                variant_id,
                product_id,
                sku: "TR-42-BLU".into(),
                name: "Trail Runner / 42 / Blue".into(),
                quantity: 2,
                unit_price: Money::new(dec!(100.00)),
                is_active: true,
            },
        );
        store.add_coupon(Coupon::percentage("WELCOME10", dec!(10)));

        let (state, _worker) =
            api::create_state(ledger.clone(), store.clone(), &Config::default());
        let app = api::create_app(state, get_metrics_handle());

        Self {
            app,
            ledger,
            store,
            user_id,
            address_id,
            variant_id,
        }
    }

    fn checkout_body(&self) -> Value {
        json!({
            "user_id": self.user_id,
            "shipping_address_id": self.address_id,
            "billing_address_id": self.address_id,
            "payment_method": "CARD",
            "coupon_code": "WELCOME10"
        })
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap();
        send(self.app.clone(), request).await
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        send(self.app.clone(), request).await
    }

    async fn place_order(&self) -> String {
        let (status, order) = self.post("/checkout", self.checkout_body()).await;
        assert_eq!(status, StatusCode::CREATED);
        order["id"].as_str().unwrap().to_string()
    }
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health_check() {
    let test = TestApp::new().await;

    let (status, json) = test.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_checkout_creates_priced_order() {
    let test = TestApp::new().await;

    let (status, order) = test.post("/checkout", test.checkout_body()).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["status"], "PENDING");
    assert_eq!(order["version"], 1);
    assert_eq!(order["subtotal"], "200.00");
    assert_eq!(order["discount"], "20.00");
    assert_eq!(order["shipping_cost"], "50.00");
    assert_eq!(order["tax"], "32.40");
    assert_eq!(order["total"], "262.40");
    assert_eq!(order["coupon_code"], "WELCOME10");
    assert_eq!(order["payment_method"], "CARD");
    assert!(order["order_number"].as_str().unwrap().starts_with("ORD-"));
    assert_eq!(order["items"].as_array().unwrap().len(), 1);
    assert_eq!(order["items"][0]["unit_price"], "100.00");

    assert_eq!(test.ledger.stock_of(test.variant_id).await, Some(8));
    assert!(test.store.cart(test.user_id).is_empty());
}

#[tokio::test]
async fn test_checkout_with_empty_cart_is_bad_request() {
    let test = TestApp::new().await;
    test.place_order().await;

    let (status, json) = test.post("/checkout", test.checkout_body()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Cart is empty");
}

#[tokio::test]
async fn test_checkout_with_unknown_address_is_not_found() {
    let test = TestApp::new().await;
    let mut body = test.checkout_body();
    body["shipping_address_id"] = json!(AddressId::new());

    let (status, json) = test.post("/checkout", body).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "Shipping address not found");
    assert_eq!(test.ledger.stock_of(test.variant_id).await, Some(10));
}

#[tokio::test]
async fn test_checkout_with_unknown_coupon_releases_stock() {
    let test = TestApp::new().await;
    let mut body = test.checkout_body();
    body["coupon_code"] = json!("NOPE");

    let (status, json) = test.post("/checkout", body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("NOPE"));
    assert_eq!(test.ledger.stock_of(test.variant_id).await, Some(10));
    assert_eq!(test.store.cart(test.user_id).len(), 1);
}

#[tokio::test]
async fn test_get_order_is_scoped_to_owner() {
    let test = TestApp::new().await;
    let order_id = test.place_order().await;

    let (status, order) = test
        .get(&format!("/orders/{order_id}?user_id={}", test.user_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["id"], order_id);

    let (status, _) = test
        .get(&format!("/orders/{order_id}?user_id={}", UserId::new()))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_ids_are_bad_requests() {
    let test = TestApp::new().await;

    let (status, json) = test
        .get(&format!("/orders/not-a-uuid?user_id={}", test.user_id))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().starts_with("Invalid order id"));

    let (status, _) = test.get("/inventory/xyz/availability").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancel_restores_stock_and_is_idempotent() {
    let test = TestApp::new().await;
    let order_id = test.place_order().await;
    let uri = format!("/orders/{order_id}/cancel");
    let body = json!({ "user_id": test.user_id, "reason": "Changed my mind" });

    let (status, order) = test.post(&uri, body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "CANCELLED");
    assert_eq!(order["cancellation_reason"], "Changed my mind");
    assert_eq!(order["version"], 2);
    assert_eq!(test.ledger.stock_of(test.variant_id).await, Some(10));

    let (status, order) = test.post(&uri, body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["version"], 2);
    assert_eq!(test.ledger.stock_of(test.variant_id).await, Some(10));
}

#[tokio::test]
async fn test_tracking_history_follows_status_changes() {
    let test = TestApp::new().await;
    let order_id = test.place_order().await;

    let (status, order) = test
        .post(
            &format!("/orders/{order_id}/status"),
            json!({ "status": "PROCESSING" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "PROCESSING");

    let (status, history) = test
        .get(&format!("/orders/{order_id}/tracking?user_id={}", test.user_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["status"], "PENDING");
    assert_eq!(history[0]["note"], "Order placed");
    assert_eq!(history[1]["status"], "PROCESSING");
    assert_eq!(
        history[1]["note"],
        "Status changed from PENDING to PROCESSING"
    );
}

#[tokio::test]
async fn test_cancel_after_shipping_is_conflict() {
    let test = TestApp::new().await;
    let order_id = test.place_order().await;
    let status_uri = format!("/orders/{order_id}/status");

    for next in ["PROCESSING", "SHIPPED"] {
        let (status, _) = test.post(&status_uri, json!({ "status": next })).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, json) = test
        .post(
            &format!("/orders/{order_id}/cancel"),
            json!({ "user_id": test.user_id }),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("SHIPPED to CANCELLED"));
    assert_eq!(test.ledger.stock_of(test.variant_id).await, Some(8));
}

#[tokio::test]
async fn test_unknown_status_is_bad_request() {
    let test = TestApp::new().await;
    let order_id = test.place_order().await;

    let (status, _) = test
        .post(
            &format!("/orders/{order_id}/status"),
            json!({ "status": "ARCHIVED" }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_availability() {
    let test = TestApp::new().await;

    let (status, json) = test
        .get(&format!(
            "/inventory/{}/availability?quantity=11",
            test.variant_id
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["available"], false);
    assert_eq!(json["current_stock"], 10);

    let (status, json) = test
        .get(&format!("/inventory/{}/availability", test.variant_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["available"], true);
    assert_eq!(json["quantity"], 1);

    let (status, _) = test
        .get(&format!("/inventory/{}/availability", VariantId::new()))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let test = TestApp::new().await;
    test.place_order().await;

    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("checkout_attempts_total"));
}
