//! Order Model
//!
//! An order is an immutable economic record from the moment it is created:
//! line items carry their own name/price snapshot so later menu edits never
//! alter historical orders. Only the status and payment fields evolve, and
//! the status moves strictly forward through the transition table encoded in
//! [`OrderStatus::can_transition_to`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Order status state machine
///
/// CANCELLED is terminal. SERVED permits only the cancellation reversal
/// (voiding a served order), which restores the deducted stock. READY can
/// only move to SERVED.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Pending,
    Accepted,
    Preparing,
    Ready,
    Served,
    Cancelled,
}

impl OrderStatus {
    /// Whether the order's kitchen flow is over (served or cancelled)
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Served | OrderStatus::Cancelled)
    }

    /// Transition table for the order state machine
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted | Preparing | Served | Cancelled)
                | (Accepted, Preparing | Served | Cancelled)
                | (Preparing, Ready | Served | Cancelled)
                | (Ready, Served)
                | (Served, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Accepted => "ACCEPTED",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::Ready => "READY",
            OrderStatus::Served => "SERVED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable payment state of an order (authoritative for "is this order paid")
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn is_settled(&self) -> bool {
        matches!(self, PaymentStatus::Paid)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Card,
    Online,
}

/// Where the order entered the system
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSource {
    #[default]
    Manual,
    Qr,
    Voice,
    Whatsapp,
}

/// Order line item — a snapshot of name/price/quantity at order time.
///
/// Never re-derived from the live menu.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    /// Menu item reference (identity only, attributes are snapshotted)
    pub menu_item_id: String,
    pub name: String,
    /// Unit price in currency unit at order time
    pub price: f64,
    pub quantity: i64,
    pub note: Option<String>,
}

/// One entry of the append-only status audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: OrderStatus,
    pub actor: String,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

/// Order entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub restaurant_id: String,
    pub table_id: Option<String>,
    /// Shared by all orders of one table sitting
    pub session_id: Option<String>,
    pub order_number: String,
    pub items: Vec<OrderItem>,
    pub subtotal: f64,
    pub tax: f64,
    pub tip: f64,
    pub discount: f64,
    /// `max(0, subtotal + tax + tip - discount)`
    pub total: f64,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub source: OrderSource,
    /// Append-only, never mutated in place
    pub status_history: Vec<StatusHistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub preparing_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub served_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
}
