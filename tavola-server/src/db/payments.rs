//! Payment record persistence
//!
//! One row per gateway payment attempt, keyed by the gateway's tracking
//! identifier (UNIQUE). Rows are an audit trail and are never deleted.

use chrono::{DateTime, Utc};
use shared::{AppResult, GatewayId, Payment, PaymentRecordStatus};
use sqlx::SqlitePool;

const COLUMNS: &str =
    "id, order_id, restaurant_id, gateway, tracking_id, amount, currency, status, \
     created_at, updated_at";

pub async fn insert(pool: &SqlitePool, payment: &Payment) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO payments (id, order_id, restaurant_id, gateway, tracking_id, amount, \
            currency, status, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )
    .bind(&payment.id)
    .bind(&payment.order_id)
    .bind(&payment.restaurant_id)
    .bind(payment.gateway)
    .bind(&payment.tracking_id)
    .bind(payment.amount)
    .bind(&payment.currency)
    .bind(payment.status)
    .bind(payment.created_at)
    .bind(payment.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_by_tracking_id(
    pool: &SqlitePool,
    gateway: GatewayId,
    tracking_id: &str,
) -> AppResult<Option<Payment>> {
    let payment = sqlx::query_as::<_, Payment>(&format!(
        "SELECT {COLUMNS} FROM payments WHERE gateway = ?1 AND tracking_id = ?2"
    ))
    .bind(gateway)
    .bind(tracking_id)
    .fetch_optional(pool)
    .await?;
    Ok(payment)
}

pub async fn update_status(
    pool: &SqlitePool,
    tracking_id: &str,
    status: PaymentRecordStatus,
    now: DateTime<Utc>,
) -> AppResult<u64> {
    let result =
        sqlx::query("UPDATE payments SET status = ?2, updated_at = ?3 WHERE tracking_id = ?1")
            .bind(tracking_id)
            .bind(status)
            .bind(now)
            .execute(pool)
            .await?;
    Ok(result.rows_affected())
}

pub async fn list_by_order(pool: &SqlitePool, order_id: &str) -> AppResult<Vec<Payment>> {
    let payments = sqlx::query_as::<_, Payment>(&format!(
        "SELECT {COLUMNS} FROM payments WHERE order_id = ?1 ORDER BY created_at ASC"
    ))
    .bind(order_id)
    .fetch_all(pool)
    .await?;
    Ok(payments)
}
