//! Gateway abstraction
//!
//! Each payment provider implements [`PaymentGateway`]; the reconciliation
//! flow speaks only this trait, so provider-specific event vocabularies and
//! signature schemes never leak past their adapter.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use shared::{AppResult, GatewayId, Order, PaymentRecordStatus, Restaurant};

/// Result of creating a checkout object at the gateway
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutHandle {
    pub gateway: GatewayId,
    /// The gateway's correlation identifier; webhook events are matched
    /// back to the local payment record through it.
    pub tracking_id: String,
    pub amount: f64,
    pub currency: String,
    /// Provider-specific fields the client needs to complete the payment
    /// (client secret, checkout order id, public key).
    pub client_payload: Value,
}

/// A webhook event reduced to the internal vocabulary
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayEvent {
    pub tracking_id: String,
    pub status: PaymentRecordStatus,
    /// The provider's original event type, for logging
    pub event_type: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn id(&self) -> GatewayId;

    /// Create the provider-side payment object carrying order correlation
    /// metadata. Provider API errors surface to the caller; checkout cannot
    /// proceed without the gateway.
    async fn create_checkout(
        &self,
        order: &Order,
        restaurant: &Restaurant,
    ) -> AppResult<CheckoutHandle>;

    /// Verify the raw webhook body against its signature header.
    fn verify_signature(&self, body: &[u8], signature: &str) -> AppResult<()>;

    /// Map a verified webhook payload onto the internal status vocabulary.
    /// Returns None for event types reconciliation does not care about.
    fn parse_event(&self, body: &[u8]) -> AppResult<Option<GatewayEvent>>;
}
