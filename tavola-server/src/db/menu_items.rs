//! Menu item inventory queries
//!
//! Stock math happens inside single UPDATE statements so two concurrent
//! deductions can never interleave a read-then-write on the counter. The
//! clamp at zero and the availability/low-stock flags are recomputed in the
//! same statement.

use shared::{AppResult, MenuItem};
use sqlx::SqlitePool;

const COLUMNS: &str = "id, restaurant_id, name, price, is_available, \
                       stock_quantity, low_stock_threshold, is_low_stock";

pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<MenuItem>> {
    let item =
        sqlx::query_as::<_, MenuItem>(&format!("SELECT {COLUMNS} FROM menu_items WHERE id = ?1"))
            .bind(id)
            .fetch_optional(pool)
            .await?;
    Ok(item)
}

/// Atomically deduct stock, clamping at zero.
///
/// No-op for untracked items (`stock_quantity IS NULL`). Returns the fresh
/// row, or None if the item vanished.
pub async fn deduct(pool: &SqlitePool, id: &str, quantity: i64) -> AppResult<Option<MenuItem>> {
    sqlx::query(
        "UPDATE menu_items SET
            stock_quantity = MAX(0, stock_quantity - ?2),
            is_available = CASE WHEN stock_quantity - ?2 <= 0 THEN 0 ELSE is_available END,
            is_low_stock = CASE
                WHEN MAX(0, stock_quantity - ?2) BETWEEN 1 AND low_stock_threshold THEN 1
                ELSE 0
            END
         WHERE id = ?1 AND stock_quantity IS NOT NULL",
    )
    .bind(id)
    .bind(quantity)
    .execute(pool)
    .await?;

    find_by_id(pool, id).await
}

/// Atomically restore stock (cancellation-after-serve reversal).
///
/// An item that was driven unavailable by stock exhaustion becomes
/// available again once it holds stock.
pub async fn restore(pool: &SqlitePool, id: &str, quantity: i64) -> AppResult<Option<MenuItem>> {
    sqlx::query(
        "UPDATE menu_items SET
            stock_quantity = stock_quantity + ?2,
            is_available = CASE WHEN stock_quantity + ?2 > 0 THEN 1 ELSE is_available END,
            is_low_stock = CASE
                WHEN stock_quantity + ?2 BETWEEN 1 AND low_stock_threshold THEN 1
                ELSE 0
            END
         WHERE id = ?1 AND stock_quantity IS NOT NULL",
    )
    .bind(id)
    .bind(quantity)
    .execute(pool)
    .await?;

    find_by_id(pool, id).await
}
