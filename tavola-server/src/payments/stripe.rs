//! Stripe integration via REST API (no SDK dependency)
//!
//! Checkout creates a PaymentIntent; the intent id is the tracking
//! identifier webhook events carry back.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde_json::{Value, json};
use sha2::Sha256;
use shared::{AppError, AppResult, GatewayId, Order, PaymentRecordStatus, Restaurant};

use super::gateway::{CheckoutHandle, GatewayEvent, PaymentGateway};
use crate::orders::money;

/// Maximum accepted age of a webhook timestamp, to prevent replay attacks
const MAX_TIMESTAMP_SKEW_SECS: i64 = 300;

pub struct StripeGateway {
    http: reqwest::Client,
    secret_key: String,
    webhook_secret: String,
}

impl StripeGateway {
    pub fn new(http: reqwest::Client, secret_key: String, webhook_secret: String) -> Self {
        Self {
            http,
            secret_key,
            webhook_secret,
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn id(&self) -> GatewayId {
        GatewayId::Stripe
    }

    async fn create_checkout(
        &self,
        order: &Order,
        restaurant: &Restaurant,
    ) -> AppResult<CheckoutHandle> {
        let amount = money::to_minor_units(order.total)?.to_string();
        let currency = restaurant.currency.to_lowercase();
        let resp: Value = self
            .http
            .post("https://api.stripe.com/v1/payment_intents")
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&[
                ("amount", amount.as_str()),
                ("currency", currency.as_str()),
                ("metadata[order_id]", &order.id),
                ("metadata[order_number]", &order.order_number),
                ("metadata[restaurant_id]", &order.restaurant_id),
            ])
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("Stripe request failed: {e}")))?
            .json()
            .await
            .map_err(|e| AppError::gateway(format!("Stripe returned invalid JSON: {e}")))?;

        let tracking_id = resp["id"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| AppError::gateway(format!("Stripe create_payment_intent failed: {resp}")))?;

        Ok(CheckoutHandle {
            gateway: GatewayId::Stripe,
            tracking_id,
            amount: order.total,
            currency: restaurant.currency.clone(),
            client_payload: json!({ "client_secret": resp["client_secret"] }),
        })
    }

    /// Verify the `Stripe-Signature` header (HMAC-SHA256 over "{t}.{body}")
    fn verify_signature(&self, body: &[u8], signature: &str) -> AppResult<()> {
        let mut timestamp = "";
        let mut expected = "";
        for part in signature.split(',') {
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = t;
            } else if let Some(v) = part.strip_prefix("v1=") {
                expected = v;
            }
        }
        if timestamp.is_empty() || expected.is_empty() {
            return Err(AppError::invalid_signature("malformed Stripe-Signature header"));
        }

        let signed_payload = format!("{timestamp}.{}", std::str::from_utf8(body).unwrap_or(""));
        let mut mac = Hmac::<Sha256>::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| AppError::invalid_signature("invalid webhook secret"))?;
        mac.update(signed_payload.as_bytes());

        // Decode hex signature and use constant-time comparison via hmac::verify_slice
        let sig_bytes = hex::decode(expected)
            .map_err(|_| AppError::invalid_signature("signature is not valid hex"))?;
        mac.verify_slice(&sig_bytes)
            .map_err(|_| AppError::invalid_signature("webhook signature mismatch"))?;

        // Reject events older than 5 minutes to prevent replay attacks
        let ts: i64 = timestamp
            .parse()
            .map_err(|_| AppError::invalid_signature("invalid timestamp"))?;
        let now = chrono::Utc::now().timestamp();
        if (now - ts).abs() > MAX_TIMESTAMP_SKEW_SECS {
            return Err(AppError::invalid_signature("webhook timestamp too old"));
        }

        Ok(())
    }

    fn parse_event(&self, body: &[u8]) -> AppResult<Option<GatewayEvent>> {
        let event: Value = serde_json::from_slice(body)?;
        let event_type = event["type"].as_str().unwrap_or_default().to_string();
        let object = &event["data"]["object"];

        let (status, tracking) = match event_type.as_str() {
            "payment_intent.succeeded" => (PaymentRecordStatus::Completed, &object["id"]),
            "payment_intent.processing" => (PaymentRecordStatus::Processing, &object["id"]),
            "payment_intent.payment_failed" | "payment_intent.canceled" => {
                (PaymentRecordStatus::Failed, &object["id"])
            }
            // Refunds arrive on the charge; correlate through its intent
            "charge.refunded" => (PaymentRecordStatus::Refunded, &object["payment_intent"]),
            _ => return Ok(None),
        };

        let tracking_id = tracking
            .as_str()
            .map(String::from)
            .ok_or_else(|| AppError::validation(format!("Stripe event {event_type} has no id")))?;

        Ok(Some(GatewayEvent {
            tracking_id,
            status,
            event_type,
        }))
    }
}
