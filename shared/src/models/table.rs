//! Dining Table Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Table occupancy status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableStatus {
    #[default]
    Free,
    Occupied,
    Reserved,
    Cleaning,
}

/// Dining table entity
///
/// The session fields are set on the first order of a sitting, reused for
/// subsequent orders, and cleared when the bill is settled or the table is
/// manually reset. `session_id` is authoritative for grouping the sitting's
/// orders; `session_token` is the per-session secret embedded in the QR
/// payload; `session_order_id` links the most recent order of the sitting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct DiningTable {
    pub id: String,
    pub restaurant_id: String,
    pub name: String,
    pub capacity: i64,
    pub location: Option<String>,
    pub status: TableStatus,
    pub session_id: Option<String>,
    pub session_token: Option<String>,
    pub occupied_at: Option<DateTime<Utc>>,
    pub session_order_id: Option<String>,
}
