//! Checkout against PostgreSQL.
//!
//! These tests use a shared PostgreSQL container. Run with:
//!
//! ```bash
//! cargo test -p checkout --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;
use std::time::Duration;

use checkout::{
    CheckoutError, Collaborators, CreateOrderRequest, InMemoryAuditLog, OrderOrchestrator,
    OrderRepository, PostgresStore, RepositoryError, TaskQueue,
};
use common::{AddressId, ProductId, UserId, VariantId};
use domain::{Money, OrderStatus, PaymentMethod, PaymentStatus, PricingError, TrackingUpdate};
use inventory::{InventoryLedger, PostgresInventoryLedger};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresStore::new(temp_pool.clone())
                .run_migrations()
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

type Orchestrator = OrderOrchestrator<PostgresInventoryLedger, PostgresStore>;

struct Fixture {
    pool: PgPool,
    store: PostgresStore,
    ledger: PostgresInventoryLedger,
    orchestrator: Orchestrator,
    user_id: UserId,
    address_id: AddressId,
}

async fn fixture() -> Fixture {
    let info = get_container_info().await;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE order_tracking, payments, order_items, orders, coupons, cart_items, \
         carts, addresses, product_variants, products CASCADE",
    )
    .execute(&pool)
    .await
    .unwrap();

    let store = PostgresStore::new(pool.clone());
    let ledger = PostgresInventoryLedger::new(pool.clone());
    let (queue, _rx) = TaskQueue::channel();
    let collaborators = Collaborators {
        addresses: Arc::new(store.clone()),
        carts: Arc::new(store.clone()),
        coupons: Arc::new(store.clone()),
        audit: Arc::new(InMemoryAuditLog::new()),
    };
    let orchestrator = OrderOrchestrator::new(ledger.clone(), store.clone(), collaborators, queue)
        .with_reservation_timeout(Duration::from_secs(5));

    let user_id = UserId::new();
    let address_id = AddressId::new();
    sqlx::query(
        r#"
        INSERT INTO addresses (id, user_id, recipient, line1, city, state, postal_code, country)
        VALUES ($1, $2, 'Test Customer', '42 Market Road', 'Bengaluru', 'KA', '560001', 'IN')
        "#,
    )
    .bind(address_id.as_uuid())
    .bind(user_id.as_uuid())
    .execute(&pool)
    .await
    .unwrap();

    sqlx::query("INSERT INTO carts (id, user_id) VALUES ($1, $2)")
        .bind(uuid::Uuid::new_v4())
        .bind(user_id.as_uuid())
        .execute(&pool)
        .await
        .unwrap();

    Fixture {
        pool,
        store,
        ledger,
        orchestrator,
        user_id,
        address_id,
    }
}

impl Fixture {
    async fn variant(&self, sku: &str, price: Decimal, stock: i32) -> (ProductId, VariantId) {
        let product_id = ProductId::new();
        let variant_id = VariantId::new();

        sqlx::query("INSERT INTO products (id, name) VALUES ($1, $2)")
            .bind(product_id.as_uuid())
            .bind(format!("{sku} product"))
            .execute(&self.pool)
            .await
            .unwrap();
        sqlx::query(
            r#"
            INSERT INTO product_variants (id, product_id, sku, name, price, stock)
            VALUES ($1, $2, $3, $3, $4, $5)
            "#,
        )
        .bind(variant_id.as_uuid())
        .bind(product_id.as_uuid())
        .bind(sku)
        .bind(price)
        .bind(stock)
        .execute(&self.pool)
        .await
        .unwrap();

        (product_id, variant_id)
    }

    async fn add_to_cart(&self, variant_id: VariantId, quantity: i32) {
        sqlx::query(
            r#"
            INSERT INTO cart_items (cart_id, variant_id, quantity)
            SELECT id, $2, $3 FROM carts WHERE user_id = $1
            "#,
        )
        .bind(self.user_id.as_uuid())
        .bind(variant_id.as_uuid())
        .bind(quantity)
        .execute(&self.pool)
        .await
        .unwrap();
    }

    async fn add_coupon(&self, code: &str, percent: Decimal, usage_limit: i32, usage_count: i32) {
        sqlx::query(
            r#"
            INSERT INTO coupons (code, discount_type, discount_value, usage_limit, usage_count)
            VALUES ($1, 'PERCENTAGE', $2, $3, $4)
            "#,
        )
        .bind(code)
        .bind(percent)
        .bind(usage_limit)
        .bind(usage_count)
        .execute(&self.pool)
        .await
        .unwrap();
    }

    async fn stock(&self, variant_id: VariantId) -> u32 {
        self.ledger
            .check_availability(variant_id, 0)
            .await
            .unwrap()
            .current_stock
    }

    async fn scalar(&self, sql: &str) -> i64 {
        sqlx::query_scalar(sql).fetch_one(&self.pool).await.unwrap()
    }

    fn request(&self, coupon_code: Option<&str>) -> CreateOrderRequest {
        CreateOrderRequest {
            user_id: self.user_id,
            shipping_address_id: self.address_id,
            billing_address_id: self.address_id,
            payment_method: PaymentMethod::Upi,
            coupon_code: coupon_code.map(str::to_string),
            notes: Some("leave at the door".into()),
        }
    }
}

#[tokio::test]
#[serial]
async fn checkout_persists_every_row_in_one_transaction() {
    let f = fixture().await;
    let (product_a, a) = f.variant("SKU-A", dec!(50.00), 10).await;
    let (_, b) = f.variant("SKU-B", dec!(100.00), 5).await;
    f.add_to_cart(a, 2).await;
    f.add_to_cart(b, 1).await;
    f.add_coupon("SAVE10", dec!(10), 100, 0).await;

    let order = f
        .orchestrator
        .create_order(f.request(Some("SAVE10")))
        .await
        .unwrap();

    assert_eq!(order.totals.total, Money::new(dec!(262.40)));
    assert_eq!(f.stock(a).await, 8);
    assert_eq!(f.stock(b).await, 4);

    let stored = f.store.find_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.order_number, order.order_number);
    assert_eq!(stored.totals, order.totals);
    assert_eq!(stored.items, order.items);
    assert_eq!(stored.notes.as_deref(), Some("leave at the door"));
    assert_eq!(stored.status, OrderStatus::Pending);

    let payment = f.store.payment_for(order.id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.method, PaymentMethod::Upi);

    assert_eq!(f.scalar("SELECT COUNT(*) FROM cart_items").await, 0);
    assert_eq!(
        f.scalar("SELECT usage_count::BIGINT FROM coupons WHERE code = 'SAVE10'")
            .await,
        1
    );
    let sold: i64 = sqlx::query_scalar("SELECT sold_count FROM products WHERE id = $1")
        .bind(product_a.as_uuid())
        .fetch_one(&f.pool)
        .await
        .unwrap();
    assert_eq!(sold, 2);

    let history = f.store.tracking_history(order.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].note, "Order placed");
}

#[tokio::test]
#[serial]
async fn exhausted_coupon_releases_stock() {
    let f = fixture().await;
    let (_, a) = f.variant("SKU-A", dec!(20.00), 5).await;
    f.add_to_cart(a, 2).await;
    f.add_coupon("USED", dec!(10), 1, 1).await;

    let err = f
        .orchestrator
        .create_order(f.request(Some("USED")))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::Pricing(PricingError::UsageLimitExceeded { .. })
    ));
    assert_eq!(f.stock(a).await, 5);
    assert_eq!(f.scalar("SELECT COUNT(*) FROM orders").await, 0);
    assert_eq!(f.scalar("SELECT COUNT(*) FROM cart_items").await, 1);
}

#[tokio::test]
#[serial]
async fn guarded_coupon_increment_rejects_exhausted_coupon() {
    let f = fixture().await;
    let (_, a) = f.variant("SKU-A", dec!(20.00), 5).await;
    f.add_to_cart(a, 1).await;
    f.add_coupon("ONCE", dec!(10), 1, 0).await;

    let order = f
        .orchestrator
        .create_order(f.request(Some("ONCE")))
        .await
        .unwrap();
    assert_eq!(order.coupon_code.as_deref(), Some("ONCE"));

    // Replaying the same placement must not push usage past the limit.
    let mut replay = checkout::OrderPlacement::new(order.clone(), chrono::Utc::now());
    replay.order.id = common::OrderId::new();
    replay.order.order_number = format!("{}-R", order.order_number);
    replay.payment.order_id = replay.order.id;
    replay.payment.id = common::PaymentId::new();
    replay.tracking.order_id = replay.order.id;

    let err = f.store.place_order(&replay).await.unwrap_err();
    assert!(matches!(err, RepositoryError::CouponExhausted(code) if code == "ONCE"));
    assert_eq!(f.scalar("SELECT COUNT(*) FROM orders").await, 1);
}

#[tokio::test]
#[serial]
async fn cancel_restores_stock_and_rejects_stale_writers() {
    let f = fixture().await;
    let (_, a) = f.variant("SKU-A", dec!(20.00), 5).await;
    f.add_to_cart(a, 3).await;

    let order = f.orchestrator.create_order(f.request(None)).await.unwrap();
    assert_eq!(f.stock(a).await, 2);

    let cancelled = f
        .orchestrator
        .cancel_order(order.id, f.user_id, Some("changed my mind".into()))
        .await
        .unwrap();
    assert_eq!(cancelled.version, 2);
    assert_eq!(f.stock(a).await, 5);

    let stored = f.store.find_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Cancelled);
    assert_eq!(stored.cancellation_reason.as_deref(), Some("changed my mind"));

    // A writer that read the order before the cancel.
    let mut stale = order.clone();
    stale
        .transition(OrderStatus::Processing, None, chrono::Utc::now())
        .unwrap();
    let tracking = TrackingUpdate::new(stale.id, stale.status, "late", chrono::Utc::now());
    let err = f.store.save_status(&stale, 1, &tracking).await.unwrap_err();
    assert!(matches!(
        err,
        RepositoryError::ConcurrencyConflict { expected: 1, .. }
    ));
    assert_eq!(f.store.tracking_history(order.id).await.unwrap().len(), 2);
}

#[tokio::test]
#[serial]
async fn insufficient_stock_releases_earlier_lines() {
    let f = fixture().await;
    let (_, a) = f.variant("SKU-A", dec!(10.00), 4).await;
    let (_, b) = f.variant("SKU-B", dec!(10.00), 1).await;
    f.add_to_cart(a, 2).await;
    f.add_to_cart(b, 2).await;

    let err = f
        .orchestrator
        .create_order(f.request(None))
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::Validation(msg) if msg.contains("SKU-B")));
    assert_eq!(f.stock(a).await, 4);
    assert_eq!(f.stock(b).await, 1);
    assert_eq!(f.scalar("SELECT COUNT(*) FROM orders").await, 0);
}
