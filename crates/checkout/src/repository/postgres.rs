//! PostgreSQL store backing every repository seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AddressId, OrderId, PaymentId, ProductId, UserId, VariantId};
use domain::{
    Coupon, Money, Order, OrderLineItem, OrderTotals, PaymentRecord, TrackingUpdate,
};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use super::{
    Address, AddressBook, CartItem, CartStore, CouponDirectory, OrderPlacement, OrderRepository,
    RepositoryError, Result,
};

const ORDER_COLUMNS: &str = r#"
    id, order_number, user_id, status, version, subtotal, discount, tax, shipping_cost, total,
    coupon_code, shipping_address_id, billing_address_id, payment_method, notes,
    cancellation_reason, created_at, updated_at
"#;

/// PostgreSQL implementation of the order repository and its collaborators.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn insert_order_rows(
        tx: &mut Transaction<'_, Postgres>,
        placement: &OrderPlacement,
    ) -> Result<()> {
        let order = &placement.order;
        let totals = &order.totals;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, order_number, user_id, status, version, subtotal, discount, tax,
                shipping_cost, total, coupon_code, shipping_address_id, billing_address_id,
                payment_method, notes, cancellation_reason, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&order.order_number)
        .bind(order.user_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.version)
        .bind(totals.subtotal.amount())
        .bind(totals.discount.amount())
        .bind(totals.tax.amount())
        .bind(totals.shipping_cost.amount())
        .bind(totals.total.amount())
        .bind(order.coupon_code.as_deref())
        .bind(order.shipping_address_id.as_uuid())
        .bind(order.billing_address_id.as_uuid())
        .bind(order.payment_method.as_str())
        .bind(order.notes.as_deref())
        .bind(order.cancellation_reason.as_deref())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut **tx)
        .await?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    order_id, position, variant_id, product_id, sku, name, quantity,
                    unit_price, subtotal
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(to_db_int(position, "line position")?)
            .bind(item.variant_id.as_uuid())
            .bind(item.product_id.as_uuid())
            .bind(&item.sku)
            .bind(&item.name)
            .bind(to_db_int(item.quantity, "quantity")?)
            .bind(item.unit_price.amount())
            .bind(item.subtotal.amount())
            .execute(&mut **tx)
            .await?;
        }

        let payment = &placement.payment;
        sqlx::query(
            r#"
            INSERT INTO payments (id, order_id, method, amount, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.order_id.as_uuid())
        .bind(payment.method.as_str())
        .bind(payment.amount.amount())
        .bind(payment.status.as_str())
        .bind(payment.created_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn insert_tracking(
        tx: &mut Transaction<'_, Postgres>,
        tracking: &TrackingUpdate,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_tracking (order_id, status, note, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(tracking.order_id.as_uuid())
        .bind(tracking.status.as_str())
        .bind(&tracking.note)
        .bind(tracking.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn load_items(&self, order_id: OrderId) -> Result<Vec<OrderLineItem>> {
        let rows = sqlx::query(
            r#"
            SELECT variant_id, product_id, sku, name, quantity, unit_price, subtotal
            FROM order_items
            WHERE order_id = $1
            ORDER BY position
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<OrderLineItem> {
                Ok(OrderLineItem {
                    variant_id: VariantId::from_uuid(row.try_get("variant_id")?),
                    product_id: ProductId::from_uuid(row.try_get("product_id")?),
                    sku: row.try_get("sku")?,
                    name: row.try_get("name")?,
                    quantity: from_db_int(row.try_get("quantity")?, "quantity")?,
                    unit_price: money(row, "unit_price")?,
                    subtotal: money(row, "subtotal")?,
                })
            })
            .collect()
    }

    async fn hydrate(&self, row: Option<PgRow>) -> Result<Option<Order>> {
        let Some(row) = row else {
            return Ok(None);
        };
        let order_id = OrderId::from_uuid(row.try_get("id")?);
        let items = self.load_items(order_id).await?;
        let status: String = row.try_get("status")?;
        let payment_method: String = row.try_get("payment_method")?;

        Ok(Some(Order {
            id: order_id,
            order_number: row.try_get("order_number")?,
            user_id: UserId::from_uuid(row.try_get("user_id")?),
            status: status.parse()?,
            version: row.try_get("version")?,
            totals: OrderTotals {
                subtotal: money(&row, "subtotal")?,
                discount: money(&row, "discount")?,
                tax: money(&row, "tax")?,
                shipping_cost: money(&row, "shipping_cost")?,
                total: money(&row, "total")?,
            },
            coupon_code: row.try_get("coupon_code")?,
            items,
            shipping_address_id: AddressId::from_uuid(row.try_get("shipping_address_id")?),
            billing_address_id: AddressId::from_uuid(row.try_get("billing_address_id")?),
            payment_method: payment_method.parse()?,
            notes: row.try_get("notes")?,
            cancellation_reason: row.try_get("cancellation_reason")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }
}

#[async_trait]
impl AddressBook for PostgresStore {
    async fn find_address(
        &self,
        user_id: UserId,
        address_id: AddressId,
    ) -> Result<Option<Address>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, recipient, line1, line2, city, state, postal_code, country
            FROM addresses
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(address_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<Address> {
            Ok(Address {
                id: AddressId::from_uuid(row.try_get("id")?),
                user_id: UserId::from_uuid(row.try_get("user_id")?),
                recipient: row.try_get("recipient")?,
                line1: row.try_get("line1")?,
                line2: row.try_get("line2")?,
                city: row.try_get("city")?,
                state: row.try_get("state")?,
                postal_code: row.try_get("postal_code")?,
                country: row.try_get("country")?,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl CartStore for PostgresStore {
    async fn load_cart(&self, user_id: UserId) -> Result<Vec<CartItem>> {
        let rows = sqlx::query(
            r#"
            SELECT ci.variant_id, v.product_id, v.sku, p.name, ci.quantity, v.price, v.is_active
            FROM carts c
            JOIN cart_items ci ON ci.cart_id = c.id
            JOIN product_variants v ON v.id = ci.variant_id
            JOIN products p ON p.id = v.product_id
            WHERE c.user_id = $1
            ORDER BY ci.added_at, ci.id
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<CartItem> {
                Ok(CartItem {
                    variant_id: VariantId::from_uuid(row.try_get("variant_id")?),
                    product_id: ProductId::from_uuid(row.try_get("product_id")?),
                    sku: row.try_get("sku")?,
                    name: row.try_get("name")?,
                    quantity: from_db_int(row.try_get("quantity")?, "quantity")?,
                    unit_price: money(row, "price")?,
                    is_active: row.try_get("is_active")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl CouponDirectory for PostgresStore {
    async fn find_coupon(&self, code: &str) -> Result<Option<Coupon>> {
        let row = sqlx::query(
            r#"
            SELECT code, discount_type, discount_value, min_purchase, max_discount,
                   usage_limit, usage_count, is_active, starts_at, expires_at
            FROM coupons
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<Coupon> {
            let discount_type: String = row.try_get("discount_type")?;
            let usage_limit: Option<i32> = row.try_get("usage_limit")?;
            Ok(Coupon {
                code: row.try_get("code")?,
                discount_type: discount_type.parse()?,
                discount_value: row.try_get("discount_value")?,
                min_purchase: row
                    .try_get::<Option<Decimal>, _>("min_purchase")?
                    .map(Money::new),
                max_discount: row
                    .try_get::<Option<Decimal>, _>("max_discount")?
                    .map(Money::new),
                usage_limit: usage_limit
                    .map(|limit| from_db_int(limit, "usage_limit"))
                    .transpose()?,
                usage_count: from_db_int(row.try_get("usage_count")?, "usage_count")?,
                is_active: row.try_get("is_active")?,
                starts_at: row.try_get::<Option<DateTime<Utc>>, _>("starts_at")?,
                expires_at: row.try_get::<Option<DateTime<Utc>>, _>("expires_at")?,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl OrderRepository for PostgresStore {
    #[tracing::instrument(
        skip(self, placement),
        fields(order_number = %placement.order.order_number)
    )]
    async fn place_order(&self, placement: &OrderPlacement) -> Result<()> {
        let order = &placement.order;
        let mut tx = self.pool.begin().await?;

        Self::insert_order_rows(&mut tx, placement).await?;

        for (product_id, sold) in placement.sold_per_product() {
            sqlx::query(
                r#"
                UPDATE products SET sold_count = sold_count + $2, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(product_id.as_uuid())
            .bind(i64::try_from(sold).map_err(|_| {
                RepositoryError::Corrupt(format!("sold count {sold} out of range"))
            })?)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(code) = &order.coupon_code {
            let updated = sqlx::query(
                r#"
                UPDATE coupons
                SET usage_count = usage_count + 1
                WHERE code = $1 AND (usage_limit IS NULL OR usage_count < usage_limit)
                "#,
            )
            .bind(code)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(RepositoryError::CouponExhausted(code.clone()));
            }
        }

        sqlx::query(
            "DELETE FROM cart_items WHERE cart_id IN (SELECT id FROM carts WHERE user_id = $1)",
        )
        .bind(order.user_id.as_uuid())
        .execute(&mut *tx)
        .await?;

        Self::insert_tracking(&mut tx, &placement.tracking).await?;

        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(
        skip(self, order, tracking),
        fields(order_id = %order.id, status = %order.status)
    )]
    async fn save_status(
        &self,
        order: &Order,
        expected_version: i64,
        tracking: &TrackingUpdate,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, version = $3, cancellation_reason = $4, updated_at = $5
            WHERE id = $1 AND version = $6
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.version)
        .bind(order.cancellation_reason.as_deref())
        .bind(order.updated_at)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM orders WHERE id = $1")
                .bind(order.id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?
                .is_some();
            tx.rollback().await?;
            return Err(if exists {
                RepositoryError::ConcurrencyConflict {
                    order_id: order.id,
                    expected: expected_version,
                }
            } else {
                RepositoryError::OrderNotFound(order.id)
            });
        }

        Self::insert_tracking(&mut tx, tracking).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        self.hydrate(row).await
    }

    async fn find_order_for_user(
        &self,
        order_id: OrderId,
        user_id: UserId,
    ) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND user_id = $2"
        ))
        .bind(order_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        self.hydrate(row).await
    }

    async fn tracking_history(&self, order_id: OrderId) -> Result<Vec<TrackingUpdate>> {
        let rows = sqlx::query(
            "SELECT status, note, created_at FROM order_tracking WHERE order_id = $1 ORDER BY id",
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<TrackingUpdate> {
                let status: String = row.try_get("status")?;
                Ok(TrackingUpdate {
                    order_id,
                    status: status.parse()?,
                    note: row.try_get("note")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn payment_for(&self, order_id: OrderId) -> Result<Option<PaymentRecord>> {
        let row = sqlx::query(
            "SELECT id, method, amount, status, created_at FROM payments WHERE order_id = $1",
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<PaymentRecord> {
            let method: String = row.try_get("method")?;
            let status: String = row.try_get("status")?;
            Ok(PaymentRecord {
                id: PaymentId::from_uuid(row.try_get("id")?),
                order_id,
                method: method.parse()?,
                amount: money(&row, "amount")?,
                status: status.parse()?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }
}

fn money(row: &PgRow, column: &str) -> Result<Money> {
    Ok(Money::new(row.try_get::<Decimal, _>(column)?))
}

fn to_db_int<T>(value: T, what: &str) -> Result<i32>
where
    T: TryInto<i32> + Copy + std::fmt::Display,
{
    value
        .try_into()
        .map_err(|_| RepositoryError::Corrupt(format!("{what} {value} out of range")))
}

fn from_db_int(value: i32, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Corrupt(format!("negative {what} {value}")))
}
