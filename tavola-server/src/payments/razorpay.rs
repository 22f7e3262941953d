//! Razorpay integration via REST API (no SDK dependency)
//!
//! Checkout creates a Razorpay Order; its id is the tracking identifier.
//! Webhook payment/refund entities carry that order id back in
//! `payload.*.entity.order_id`.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde_json::{Value, json};
use sha2::Sha256;
use shared::{AppError, AppResult, GatewayId, Order, PaymentRecordStatus, Restaurant};

use super::gateway::{CheckoutHandle, GatewayEvent, PaymentGateway};
use crate::orders::money;

pub struct RazorpayGateway {
    http: reqwest::Client,
    key_id: String,
    key_secret: String,
    webhook_secret: String,
}

impl RazorpayGateway {
    pub fn new(
        http: reqwest::Client,
        key_id: String,
        key_secret: String,
        webhook_secret: String,
    ) -> Self {
        Self {
            http,
            key_id,
            key_secret,
            webhook_secret,
        }
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn id(&self) -> GatewayId {
        GatewayId::Razorpay
    }

    async fn create_checkout(
        &self,
        order: &Order,
        restaurant: &Restaurant,
    ) -> AppResult<CheckoutHandle> {
        let resp: Value = self
            .http
            .post("https://api.razorpay.com/v1/orders")
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&json!({
                "amount": money::to_minor_units(order.total)?,
                "currency": restaurant.currency,
                "receipt": order.order_number,
                "notes": {
                    "order_id": order.id,
                    "order_number": order.order_number,
                    "restaurant_id": order.restaurant_id,
                },
            }))
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("Razorpay request failed: {e}")))?
            .json()
            .await
            .map_err(|e| AppError::gateway(format!("Razorpay returned invalid JSON: {e}")))?;

        let tracking_id = resp["id"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| AppError::gateway(format!("Razorpay create_order failed: {resp}")))?;

        Ok(CheckoutHandle {
            gateway: GatewayId::Razorpay,
            tracking_id: tracking_id.clone(),
            amount: order.total,
            currency: restaurant.currency.clone(),
            client_payload: json!({ "razorpay_order_id": tracking_id, "key_id": self.key_id }),
        })
    }

    /// Verify the `X-Razorpay-Signature` header (hex HMAC-SHA256 over the
    /// raw body)
    fn verify_signature(&self, body: &[u8], signature: &str) -> AppResult<()> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| AppError::invalid_signature("invalid webhook secret"))?;
        mac.update(body);

        let sig_bytes = hex::decode(signature.trim())
            .map_err(|_| AppError::invalid_signature("signature is not valid hex"))?;
        mac.verify_slice(&sig_bytes)
            .map_err(|_| AppError::invalid_signature("webhook signature mismatch"))?;
        Ok(())
    }

    fn parse_event(&self, body: &[u8]) -> AppResult<Option<GatewayEvent>> {
        let event: Value = serde_json::from_slice(body)?;
        let event_type = event["event"].as_str().unwrap_or_default().to_string();

        let (status, entity) = match event_type.as_str() {
            "payment.captured" => (
                PaymentRecordStatus::Completed,
                &event["payload"]["payment"]["entity"],
            ),
            "payment.authorized" => (
                PaymentRecordStatus::Processing,
                &event["payload"]["payment"]["entity"],
            ),
            "payment.failed" => (
                PaymentRecordStatus::Failed,
                &event["payload"]["payment"]["entity"],
            ),
            // Refund webhooks also carry the payment entity, which is where
            // the order id lives
            "refund.processed" => (
                PaymentRecordStatus::Refunded,
                &event["payload"]["payment"]["entity"],
            ),
            _ => return Ok(None),
        };

        let tracking_id = entity["order_id"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| {
                AppError::validation(format!("Razorpay event {event_type} has no order_id"))
            })?;

        Ok(Some(GatewayEvent {
            tracking_id,
            status,
            event_type,
        }))
    }
}
