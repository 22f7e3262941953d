//! Payment Model
//!
//! One row per attempt to collect money for an order. Payments are an
//! audit/reconciliation trail; the order's own `payment_status` stays the
//! source of truth for "is this order paid".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// External payment service provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum GatewayId {
    Stripe,
    Razorpay,
}

impl GatewayId {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayId::Stripe => "stripe",
            GatewayId::Razorpay => "razorpay",
        }
    }
}

impl std::fmt::Display for GatewayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GatewayId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stripe" => Ok(GatewayId::Stripe),
            "razorpay" => Ok(GatewayId::Razorpay),
            other => Err(format!("unknown gateway '{other}'")),
        }
    }
}

/// Internal payment-attempt status every gateway vocabulary maps onto
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentRecordStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
}

/// Payment attempt entity, keyed by the gateway's tracking identifier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    pub restaurant_id: String,
    pub gateway: GatewayId,
    /// Gateway-side correlation identifier (unique)
    pub tracking_id: String,
    pub amount: f64,
    pub currency: String,
    pub status: PaymentRecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
