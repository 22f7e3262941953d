//! Menu Item Model — inventory facet
//!
//! Only the stock-related projection of a menu item is modeled here; full
//! menu CRUD lives outside the order lifecycle engine.

use serde::{Deserialize, Serialize};

/// Menu item inventory projection
///
/// `stock_quantity` is NULL for items without stock tracking. When tracked
/// it never goes negative, and `is_available` is forced false when it
/// reaches 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct MenuItem {
    pub id: String,
    pub restaurant_id: String,
    pub name: String,
    /// Live price in currency unit (snapshotted into orders at creation)
    pub price: f64,
    pub is_available: bool,
    pub stock_quantity: Option<i64>,
    pub low_stock_threshold: i64,
    pub is_low_stock: bool,
}
