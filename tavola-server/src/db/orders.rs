//! Order persistence
//!
//! Orders are stored flat with the line-item snapshots and the append-only
//! status history serialized as JSON columns. Status and payment-status
//! writes are compare-and-swap statements: the WHERE clause carries the
//! expected previous state and callers check `rows_affected`, which makes a
//! status change an at-most-once operation under concurrent requests.

use chrono::{DateTime, Utc};
use shared::{
    AppResult, Order, OrderItem, OrderSource, OrderStatus, PaymentMethod, PaymentStatus,
    StatusHistoryEntry,
};
use sqlx::SqlitePool;

const COLUMNS: &str = "id, restaurant_id, table_id, session_id, order_number, items, \
                       subtotal, tax, tip, discount, total, status, payment_status, \
                       payment_method, source, status_history, created_at, accepted_at, \
                       preparing_at, ready_at, served_at, cancelled_at, cancel_reason";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: String,
    restaurant_id: String,
    table_id: Option<String>,
    session_id: Option<String>,
    order_number: String,
    items: String,
    subtotal: f64,
    tax: f64,
    tip: f64,
    discount: f64,
    total: f64,
    status: OrderStatus,
    payment_status: PaymentStatus,
    payment_method: Option<PaymentMethod>,
    source: OrderSource,
    status_history: String,
    created_at: DateTime<Utc>,
    accepted_at: Option<DateTime<Utc>>,
    preparing_at: Option<DateTime<Utc>>,
    ready_at: Option<DateTime<Utc>>,
    served_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    cancel_reason: Option<String>,
}

impl OrderRow {
    fn into_order(self) -> AppResult<Order> {
        let items: Vec<OrderItem> = serde_json::from_str(&self.items)?;
        let status_history: Vec<StatusHistoryEntry> = serde_json::from_str(&self.status_history)?;
        Ok(Order {
            id: self.id,
            restaurant_id: self.restaurant_id,
            table_id: self.table_id,
            session_id: self.session_id,
            order_number: self.order_number,
            items,
            subtotal: self.subtotal,
            tax: self.tax,
            tip: self.tip,
            discount: self.discount,
            total: self.total,
            status: self.status,
            payment_status: self.payment_status,
            payment_method: self.payment_method,
            source: self.source,
            status_history,
            created_at: self.created_at,
            accepted_at: self.accepted_at,
            preparing_at: self.preparing_at,
            ready_at: self.ready_at,
            served_at: self.served_at,
            cancelled_at: self.cancelled_at,
            cancel_reason: self.cancel_reason,
        })
    }
}

pub async fn insert(pool: &SqlitePool, order: &Order) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO orders (id, restaurant_id, table_id, session_id, order_number, items, \
            subtotal, tax, tip, discount, total, status, payment_status, payment_method, \
            source, status_history, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
    )
    .bind(&order.id)
    .bind(&order.restaurant_id)
    .bind(&order.table_id)
    .bind(&order.session_id)
    .bind(&order.order_number)
    .bind(serde_json::to_string(&order.items)?)
    .bind(order.subtotal)
    .bind(order.tax)
    .bind(order.tip)
    .bind(order.discount)
    .bind(order.total)
    .bind(order.status)
    .bind(order.payment_status)
    .bind(order.payment_method)
    .bind(order.source)
    .bind(serde_json::to_string(&order.status_history)?)
    .bind(order.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<Order>> {
    let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {COLUMNS} FROM orders WHERE id = ?1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.map(OrderRow::into_order).transpose()
}

pub async fn list(
    pool: &SqlitePool,
    restaurant_id: &str,
    status: Option<OrderStatus>,
) -> AppResult<Vec<Order>> {
    let rows = match status {
        Some(status) => {
            sqlx::query_as::<_, OrderRow>(&format!(
                "SELECT {COLUMNS} FROM orders \
                 WHERE restaurant_id = ?1 AND status = ?2 ORDER BY created_at DESC"
            ))
            .bind(restaurant_id)
            .bind(status)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, OrderRow>(&format!(
                "SELECT {COLUMNS} FROM orders WHERE restaurant_id = ?1 ORDER BY created_at DESC"
            ))
            .bind(restaurant_id)
            .fetch_all(pool)
            .await?
        }
    };
    rows.into_iter().map(OrderRow::into_order).collect()
}

/// All orders of one table sitting, oldest first (the "active bill" view)
pub async fn list_by_session(pool: &SqlitePool, session_id: &str) -> AppResult<Vec<Order>> {
    let rows = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {COLUMNS} FROM orders WHERE session_id = ?1 ORDER BY created_at ASC"
    ))
    .bind(session_id)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(OrderRow::into_order).collect()
}

/// Compare-and-swap status transition.
///
/// Stamps the per-status timestamp column and replaces the history JSON.
/// Returns 0 when the order's status no longer matches `from`, in which
/// case nothing was written.
pub async fn transition(
    pool: &SqlitePool,
    id: &str,
    from: OrderStatus,
    to: OrderStatus,
    at: DateTime<Utc>,
    history_json: &str,
    cancel_reason: Option<&str>,
) -> AppResult<u64> {
    let ts_column = match to {
        OrderStatus::Accepted => "accepted_at",
        OrderStatus::Preparing => "preparing_at",
        OrderStatus::Ready => "ready_at",
        OrderStatus::Served => "served_at",
        OrderStatus::Cancelled => "cancelled_at",
        // PENDING is only ever the creation status, never a transition target
        OrderStatus::Pending => "created_at",
    };
    let sql = format!(
        "UPDATE orders SET status = ?1, {ts_column} = ?2, status_history = ?3, \
            cancel_reason = COALESCE(?4, cancel_reason) \
         WHERE id = ?5 AND status = ?6"
    );
    let result = sqlx::query(&sql)
        .bind(to)
        .bind(at)
        .bind(history_json)
        .bind(cancel_reason)
        .bind(id)
        .bind(from)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Conditional payment-status update.
///
/// A PAID order only ever moves to REFUNDED; setting the current value
/// again is a no-op. Returns whether a row changed — the idempotency anchor
/// for webhook redelivery.
pub async fn set_payment_status(
    pool: &SqlitePool,
    id: &str,
    payment_status: PaymentStatus,
    method: Option<PaymentMethod>,
) -> AppResult<bool> {
    let result = sqlx::query(
        "UPDATE orders SET payment_status = ?2, payment_method = COALESCE(?3, payment_method) \
         WHERE id = ?1 AND payment_status != ?2 \
           AND (payment_status != 'PAID' OR ?2 = 'REFUNDED')",
    )
    .bind(id)
    .bind(payment_status)
    .bind(method)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Next value of the restaurant-scoped order counter (atomic upsert)
pub async fn next_order_number(pool: &SqlitePool, restaurant_id: &str) -> AppResult<i64> {
    let value: i64 = sqlx::query_scalar(
        "INSERT INTO order_counters (restaurant_id, value) VALUES (?1, 1) \
         ON CONFLICT (restaurant_id) DO UPDATE SET value = value + 1 \
         RETURNING value",
    )
    .bind(restaurant_id)
    .fetch_one(pool)
    .await?;
    Ok(value)
}
