use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tokio::time::Instant;

use crate::ledger::{
    Availability, InventoryLedger, InventoryUnit, backoff, record_release_failure,
    record_reservation,
};
use crate::{LedgerError, ProductId, Result, VariantId};

/// SQLSTATE codes that signal contention rather than a real failure.
const RETRYABLE_SQLSTATES: &[&str] = &[
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "55P03", // lock_not_available
    "57014", // query_canceled (lock_timeout fired)
];

/// PostgreSQL-backed ledger over the `product_variants.stock` column.
///
/// Each reservation runs in its own `SERIALIZABLE` transaction and commits
/// independently of any order transaction that follows it.
#[derive(Clone)]
pub struct PostgresInventoryLedger {
    pool: PgPool,
}

enum Attempt {
    Reserved,
    Insufficient,
    /// No pooled connection became free within the budget.
    TimedOut,
}

impl PostgresInventoryLedger {
    /// Creates a new PostgreSQL ledger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Loads a unit by variant ID.
    pub async fn unit(&self, variant_id: VariantId) -> Result<Option<InventoryUnit>> {
        let row = sqlx::query(
            "SELECT id, product_id, sku, stock, is_active FROM product_variants WHERE id = $1",
        )
        .bind(variant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<InventoryUnit> {
            let stock: i32 = row.try_get("stock")?;
            Ok(InventoryUnit {
                variant_id,
                product_id: ProductId::from_uuid(row.try_get("product_id")?),
                sku: row.try_get("sku")?,
                stock: stock_from_db(variant_id, stock)?,
                is_active: row.try_get("is_active")?,
            })
        })
        .transpose()
    }

    async fn try_reserve(
        &self,
        variant_id: VariantId,
        quantity: u32,
        budget: Duration,
    ) -> Result<Attempt> {
        let mut tx = match tokio::time::timeout(budget, self.pool.begin()).await {
            Ok(tx) => tx?,
            Err(_) => return Ok(Attempt::TimedOut),
        };

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        // Bound row-lock waits server side so a dropped future never races a commit.
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", budget.as_millis().max(1)))
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(
            "SELECT sku, stock, is_active FROM product_variants WHERE id = $1 FOR UPDATE",
        )
        .bind(variant_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(LedgerError::NotFound(variant_id))?;

        let is_active: bool = row.try_get("is_active")?;
        if !is_active {
            return Err(LedgerError::Inactive {
                variant_id,
                sku: row.try_get("sku")?,
            });
        }

        let stock = stock_from_db(variant_id, row.try_get("stock")?)?;
        if stock < quantity {
            tx.rollback().await?;
            return Ok(Attempt::Insufficient);
        }

        // Re-check at write time; a concurrent writer may have drained the row.
        let updated = sqlx::query(
            r#"
            UPDATE product_variants
            SET stock = stock - $2, updated_at = NOW()
            WHERE id = $1 AND stock >= $2
            "#,
        )
        .bind(variant_id.as_uuid())
        .bind(i64::from(quantity))
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(Attempt::Insufficient);
        }

        tx.commit().await?;
        Ok(Attempt::Reserved)
    }

    async fn try_release(&self, variant_id: VariantId, quantity: u32) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE product_variants SET stock = stock + $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(variant_id.as_uuid())
        .bind(i64::from(quantity))
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(LedgerError::NotFound(variant_id));
        }
        Ok(())
    }
}

#[async_trait]
impl InventoryLedger for PostgresInventoryLedger {
    #[tracing::instrument(skip(self))]
    async fn reserve(
        &self,
        variant_id: VariantId,
        quantity: u32,
        timeout: Duration,
    ) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            match self.try_reserve(variant_id, quantity, remaining).await {
                Ok(Attempt::Reserved) => {
                    record_reservation("reserved");
                    return Ok(true);
                }
                Ok(Attempt::Insufficient) => {
                    record_reservation("insufficient");
                    return Ok(false);
                }
                Ok(Attempt::TimedOut) => break,
                Err(LedgerError::Database(e)) if is_transient(&e) => {
                    tracing::debug!(
                        %variant_id,
                        attempt,
                        error = %e,
                        "transient conflict, retrying"
                    );
                    let delay = backoff(attempt)
                        .min(deadline.saturating_duration_since(Instant::now()));
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }

        tracing::warn!(%variant_id, quantity, attempt, "reservation timed out under contention");
        record_reservation("timeout");
        Ok(false)
    }

    #[tracing::instrument(skip(self))]
    async fn release(&self, variant_id: VariantId, quantity: u32) {
        if let Err(e) = self.try_release(variant_id, quantity).await {
            record_release_failure();
            tracing::error!(%variant_id, quantity, error = %e, "failed to release stock");
        }
    }

    async fn check_availability(
        &self,
        variant_id: VariantId,
        quantity: u32,
    ) -> Result<Availability> {
        let unit = self
            .unit(variant_id)
            .await?
            .ok_or(LedgerError::NotFound(variant_id))?;
        Ok(Availability::of(unit.stock, unit.is_active, quantity))
    }
}

fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db
            .code()
            .is_some_and(|code| RETRYABLE_SQLSTATES.iter().any(|c| code == *c)),
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

fn stock_from_db(variant_id: VariantId, stock: i32) -> Result<u32> {
    u32::try_from(stock).map_err(|_| LedgerError::Corrupt {
        variant_id,
        reason: format!("negative stock {stock}"),
    })
}
