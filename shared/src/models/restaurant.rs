//! Restaurant Model — read collaborator
//!
//! Only the fields the order engine consumes; full restaurant management is
//! out of scope.

use serde::{Deserialize, Serialize};

use super::payment::GatewayId;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Restaurant {
    pub id: String,
    pub name: String,
    /// ISO currency code, e.g. "EUR", "INR"
    pub currency: String,
    /// Fractional tax rate, e.g. 0.10 for 10%
    pub tax_rate: f64,
    pub payment_gateway_preference: Option<GatewayId>,
}
