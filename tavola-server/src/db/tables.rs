//! Dining table / session queries
//!
//! Session lifecycle updates are conditional single statements checked via
//! `rows_affected`, so concurrent requests cannot double-mint a session or
//! release a table that has since been re-seated.

use chrono::{DateTime, Utc};
use shared::{AppResult, DiningTable};
use sqlx::SqlitePool;

const COLUMNS: &str = "id, restaurant_id, name, capacity, location, status, \
                       session_id, session_token, occupied_at, session_order_id";

pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<DiningTable>> {
    let table = sqlx::query_as::<_, DiningTable>(&format!(
        "SELECT {COLUMNS} FROM dining_tables WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(table)
}

pub async fn list_by_restaurant(
    pool: &SqlitePool,
    restaurant_id: &str,
) -> AppResult<Vec<DiningTable>> {
    let tables = sqlx::query_as::<_, DiningTable>(&format!(
        "SELECT {COLUMNS} FROM dining_tables WHERE restaurant_id = ?1 ORDER BY name"
    ))
    .bind(restaurant_id)
    .fetch_all(pool)
    .await?;
    Ok(tables)
}

/// Mint a session onto a table that has none. Returns the number of rows
/// written: 0 means another request won the race and its session must be
/// adopted instead.
pub async fn try_start_session(
    pool: &SqlitePool,
    table_id: &str,
    session_id: &str,
    session_token: &str,
) -> AppResult<u64> {
    let result = sqlx::query(
        "UPDATE dining_tables SET session_id = ?2, session_token = ?3
         WHERE id = ?1 AND session_id IS NULL",
    )
    .bind(table_id)
    .bind(session_id)
    .bind(session_token)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Mark the table occupied and link the sitting's latest order. Idempotent
/// per session; `occupied_at` is only stamped by the first order.
pub async fn attach_order(
    pool: &SqlitePool,
    table_id: &str,
    session_id: &str,
    order_id: &str,
    now: DateTime<Utc>,
) -> AppResult<u64> {
    let result = sqlx::query(
        "UPDATE dining_tables SET
            status = 'OCCUPIED',
            occupied_at = COALESCE(occupied_at, ?3),
            session_order_id = ?4
         WHERE id = ?1 AND session_id = ?2",
    )
    .bind(table_id)
    .bind(session_id)
    .bind(now)
    .bind(order_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Free the table only if it is still occupied by the settled sitting and
/// no non-cancelled order of that sitting remains unpaid. The outstanding
/// check lives in the same statement as the release, so a concurrent order
/// against the session cannot slip between them.
pub async fn release_if_settled(
    pool: &SqlitePool,
    table_id: &str,
    session_id: &str,
) -> AppResult<u64> {
    let result = sqlx::query(
        "UPDATE dining_tables SET
            status = 'FREE',
            session_id = NULL,
            session_token = NULL,
            occupied_at = NULL,
            session_order_id = NULL
         WHERE id = ?1 AND status = 'OCCUPIED' AND session_id = ?2
           AND NOT EXISTS (
               SELECT 1 FROM orders
               WHERE session_id = ?2
                 AND status != 'CANCELLED'
                 AND payment_status != 'PAID'
           )",
    )
    .bind(table_id)
    .bind(session_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Administrative escape hatch: force FREE and clear the session.
pub async fn reset(pool: &SqlitePool, table_id: &str) -> AppResult<u64> {
    let result = sqlx::query(
        "UPDATE dining_tables SET
            status = 'FREE',
            session_id = NULL,
            session_token = NULL,
            occupied_at = NULL,
            session_order_id = NULL
         WHERE id = ?1",
    )
    .bind(table_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
