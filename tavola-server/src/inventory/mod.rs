//! Inventory Ledger
//!
//! Per-item stock counters, mutated only as a consequence of order-status
//! events: deduction on the transition into SERVED, restoration on a
//! cancellation after serve. Availability checking at order-creation time
//! is a read-only gate — there is no reservation hold, so the deduct is an
//! atomic clamp at zero rather than a guaranteed decrement.

use std::sync::Arc;

use shared::{AppError, AppResult, MenuItem};
use sqlx::SqlitePool;

use crate::db;
use crate::events::{Event, Publisher};

/// One line of a stock mutation request
#[derive(Debug, Clone)]
pub struct StockRequest {
    pub menu_item_id: String,
    pub quantity: i64,
}

pub struct InventoryLedger {
    pool: SqlitePool,
    publisher: Arc<dyn Publisher>,
}

impl InventoryLedger {
    pub fn new(pool: SqlitePool, publisher: Arc<dyn Publisher>) -> Self {
        Self { pool, publisher }
    }

    /// Read-only availability gate used at order-creation time.
    ///
    /// Does not reserve stock; two orders for the last unit can both pass
    /// here, and the later deduct clamps instead of going negative.
    pub async fn check_availability(&self, items: &[StockRequest]) -> AppResult<()> {
        for line in items {
            let item = self.require_item(&line.menu_item_id).await?;
            if !item.is_available {
                return Err(AppError::InsufficientStock { item: item.name });
            }
            if let Some(stock) = item.stock_quantity
                && stock < line.quantity
            {
                return Err(AppError::InsufficientStock { item: item.name });
            }
        }
        Ok(())
    }

    /// Deduct stock for every tracked line item; emits low-stock and
    /// out-of-stock notifications for thresholds crossed by this deduction.
    pub async fn deduct(&self, items: &[StockRequest]) -> AppResult<()> {
        for line in items {
            let Some(before) = db::menu_items::find_by_id(&self.pool, &line.menu_item_id).await?
            else {
                tracing::warn!(item_id = %line.menu_item_id, "Deduct for missing menu item, skipped");
                continue;
            };
            if before.stock_quantity.is_none() {
                continue;
            }
            let Some(after) =
                db::menu_items::deduct(&self.pool, &line.menu_item_id, line.quantity).await?
            else {
                continue;
            };
            tracing::debug!(
                item_id = %after.id,
                deducted = line.quantity,
                remaining = after.stock_quantity.unwrap_or(0),
                "Stock deducted"
            );
            self.notify_after_deduct(&before, &after).await;
        }
        Ok(())
    }

    /// Add stock back (cancellation-after-serve reversal); emits a
    /// back-in-stock notification when an exhausted item becomes available
    /// again.
    pub async fn restore(&self, items: &[StockRequest]) -> AppResult<()> {
        for line in items {
            let Some(before) = db::menu_items::find_by_id(&self.pool, &line.menu_item_id).await?
            else {
                tracing::warn!(item_id = %line.menu_item_id, "Restore for missing menu item, skipped");
                continue;
            };
            if before.stock_quantity.is_none() {
                continue;
            }
            let Some(after) =
                db::menu_items::restore(&self.pool, &line.menu_item_id, line.quantity).await?
            else {
                continue;
            };
            tracing::debug!(
                item_id = %after.id,
                restored = line.quantity,
                remaining = after.stock_quantity.unwrap_or(0),
                "Stock restored"
            );
            if !before.is_available
                && after.is_available
                && after.stock_quantity.unwrap_or(0) > 0
            {
                self.publisher
                    .publish(Event::BackInStock {
                        restaurant_id: after.restaurant_id.clone(),
                        item_id: after.id.clone(),
                        name: after.name.clone(),
                        remaining: after.stock_quantity.unwrap_or(0),
                    })
                    .await;
            }
        }
        Ok(())
    }

    async fn notify_after_deduct(&self, before: &MenuItem, after: &MenuItem) {
        let remaining = after.stock_quantity.unwrap_or(0);
        if remaining == 0 && before.stock_quantity != Some(0) {
            self.publisher
                .publish(Event::OutOfStock {
                    restaurant_id: after.restaurant_id.clone(),
                    item_id: after.id.clone(),
                    name: after.name.clone(),
                })
                .await;
        } else if after.is_low_stock && !before.is_low_stock {
            self.publisher
                .publish(Event::LowStock {
                    restaurant_id: after.restaurant_id.clone(),
                    item_id: after.id.clone(),
                    name: after.name.clone(),
                    remaining,
                })
                .await;
        }
    }

    async fn require_item(&self, id: &str) -> AppResult<MenuItem> {
        db::menu_items::find_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("menu item {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemoryPublisher;

    async fn setup() -> (SqlitePool, Arc<MemoryPublisher>, InventoryLedger) {
        let pool = db::connect_in_memory().await.unwrap();
        sqlx::query("INSERT INTO restaurants (id, name, currency, tax_rate) VALUES ('r1', 'Trattoria', 'EUR', 0.1)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO menu_items (id, restaurant_id, name, price, is_available, stock_quantity, low_stock_threshold, is_low_stock) \
             VALUES ('m1', 'r1', 'Margherita', 9.5, 1, 10, 3, 0), \
                    ('m2', 'r1', 'House Wine', 4.0, 1, NULL, 5, 0)",
        )
        .execute(&pool)
        .await
        .unwrap();
        let publisher = Arc::new(MemoryPublisher::new());
        let ledger = InventoryLedger::new(pool.clone(), publisher.clone());
        (pool, publisher, ledger)
    }

    fn request(id: &str, quantity: i64) -> StockRequest {
        StockRequest {
            menu_item_id: id.to_string(),
            quantity,
        }
    }

    #[tokio::test]
    async fn availability_gate() {
        let (_pool, _publisher, ledger) = setup().await;

        ledger
            .check_availability(&[request("m1", 10), request("m2", 500)])
            .await
            .unwrap();

        let err = ledger
            .check_availability(&[request("m1", 11)])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock { item } if item == "Margherita"));

        let err = ledger.check_availability(&[request("mx", 1)]).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn deduct_clamps_at_zero_and_flips_availability() {
        let (pool, publisher, ledger) = setup().await;

        ledger.deduct(&[request("m1", 12)]).await.unwrap();

        let item = db::menu_items::find_by_id(&pool, "m1").await.unwrap().unwrap();
        assert_eq!(item.stock_quantity, Some(0));
        assert!(!item.is_available);
        assert!(!item.is_low_stock);
        assert_eq!(publisher.topics(), vec!["inventory.out-of-stock"]);
    }

    #[tokio::test]
    async fn low_stock_threshold_crossing_notifies_once() {
        let (pool, publisher, ledger) = setup().await;

        ledger.deduct(&[request("m1", 8)]).await.unwrap();
        let item = db::menu_items::find_by_id(&pool, "m1").await.unwrap().unwrap();
        assert_eq!(item.stock_quantity, Some(2));
        assert!(item.is_low_stock);
        assert!(item.is_available);
        assert_eq!(publisher.topics(), vec!["inventory.low-stock"]);

        // Already low: a further deduction above zero stays quiet
        ledger.deduct(&[request("m1", 1)]).await.unwrap();
        assert_eq!(publisher.topics(), vec!["inventory.low-stock"]);
    }

    #[tokio::test]
    async fn restore_reenables_exhausted_item() {
        let (pool, publisher, ledger) = setup().await;

        ledger.deduct(&[request("m1", 10)]).await.unwrap();
        ledger.restore(&[request("m1", 10)]).await.unwrap();

        let item = db::menu_items::find_by_id(&pool, "m1").await.unwrap().unwrap();
        assert_eq!(item.stock_quantity, Some(10));
        assert!(item.is_available);
        assert!(!item.is_low_stock);
        assert_eq!(
            publisher.topics(),
            vec!["inventory.out-of-stock", "inventory.back-in-stock"]
        );
    }

    #[tokio::test]
    async fn untracked_items_are_ignored_by_stock_math() {
        let (pool, publisher, ledger) = setup().await;

        ledger.deduct(&[request("m2", 3)]).await.unwrap();
        ledger.restore(&[request("m2", 3)]).await.unwrap();

        let item = db::menu_items::find_by_id(&pool, "m2").await.unwrap().unwrap();
        assert_eq!(item.stock_quantity, None);
        assert!(item.is_available);
        assert!(publisher.events().is_empty());
    }
}
