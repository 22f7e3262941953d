//! Payment Gateway Router & Reconciliation
//!
//! Routes checkout to one of two providers and folds their asynchronous
//! webhook events back onto the order. The local payment record, keyed by
//! the gateway's tracking identifier, is the join point: an event that
//! matches no record is logged and dropped, and the conditional
//! payment-status update on the order makes redelivered events no-ops.

pub mod gateway;
pub mod razorpay;
pub mod stripe;

use std::sync::Arc;

use chrono::Utc;
use shared::{
    AppError, AppResult, GatewayId, Payment, PaymentMethod, PaymentRecordStatus, PaymentStatus,
};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db;
use crate::events::{Event, Publisher};
use crate::orders::OrderEngine;
use gateway::{CheckoutHandle, PaymentGateway};

/// Outcome of processing one webhook delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The event changed order state
    Applied,
    /// A redelivery (or a late event for an already-settled order)
    Duplicate,
    /// No local payment record for the tracking id; logged and dropped
    Unmatched,
    /// An event type reconciliation does not care about
    Ignored,
}

/// Deterministic gateway routing.
///
/// A compatible explicit preference wins; otherwise INR routes to Razorpay
/// and everything else to Stripe. Pure, so the same order resolves to the
/// same gateway for its whole lifetime.
pub fn select_gateway(currency: &str, preferred: Option<GatewayId>) -> GatewayId {
    let currency = currency.to_ascii_uppercase();
    if let Some(preferred) = preferred
        && supports_currency(preferred, &currency)
    {
        return preferred;
    }
    if currency == "INR" {
        GatewayId::Razorpay
    } else {
        GatewayId::Stripe
    }
}

fn supports_currency(gateway: GatewayId, currency: &str) -> bool {
    match gateway {
        GatewayId::Razorpay => currency == "INR",
        GatewayId::Stripe => true,
    }
}

pub struct PaymentService {
    pool: SqlitePool,
    publisher: Arc<dyn Publisher>,
    engine: Arc<OrderEngine>,
    stripe: Arc<dyn PaymentGateway>,
    razorpay: Arc<dyn PaymentGateway>,
}

impl PaymentService {
    pub fn new(
        pool: SqlitePool,
        publisher: Arc<dyn Publisher>,
        engine: Arc<OrderEngine>,
        stripe: Arc<dyn PaymentGateway>,
        razorpay: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            pool,
            publisher,
            engine,
            stripe,
            razorpay,
        }
    }

    fn gateway_for(&self, id: GatewayId) -> &Arc<dyn PaymentGateway> {
        match id {
            GatewayId::Stripe => &self.stripe,
            GatewayId::Razorpay => &self.razorpay,
        }
    }

    /// Create a provider-side checkout object for the order and persist the
    /// local payment record that later webhook events will match against.
    pub async fn create_checkout(&self, order_id: &str) -> AppResult<CheckoutHandle> {
        let order = self.engine.get(order_id).await?;
        if order.payment_status.is_settled() {
            return Err(AppError::AlreadyPaid(format!(
                "order {} is already paid",
                order.order_number
            )));
        }

        let restaurant = db::restaurants::find_by_id(&self.pool, &order.restaurant_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("restaurant {}", order.restaurant_id)))?;

        let gateway_id = select_gateway(&restaurant.currency, restaurant.payment_gateway_preference);
        let handle = self
            .gateway_for(gateway_id)
            .create_checkout(&order, &restaurant)
            .await?;

        let now = Utc::now();
        db::payments::insert(
            &self.pool,
            &Payment {
                id: Uuid::new_v4().to_string(),
                order_id: order.id.clone(),
                restaurant_id: order.restaurant_id.clone(),
                gateway: handle.gateway,
                tracking_id: handle.tracking_id.clone(),
                amount: handle.amount,
                currency: handle.currency.clone(),
                status: PaymentRecordStatus::Pending,
                created_at: now,
                updated_at: now,
            },
        )
        .await?;

        // Mark the order awaiting its online payment. No event here, the
        // confirmation comes from the webhook.
        db::orders::set_payment_status(
            &self.pool,
            &order.id,
            PaymentStatus::Pending,
            Some(PaymentMethod::Online),
        )
        .await?;

        tracing::info!(
            order_id = %order.id,
            gateway = %gateway_id,
            tracking_id = %handle.tracking_id,
            "Checkout created"
        );
        Ok(handle)
    }

    /// Process one webhook delivery: verify, map, match, apply.
    ///
    /// Safe under concurrent and duplicate delivery; only the first
    /// COMPLETED event credits the order, everything after is a no-op.
    pub async fn reconcile(
        &self,
        gateway_id: GatewayId,
        body: &[u8],
        signature: &str,
    ) -> AppResult<Reconciliation> {
        let gateway = self.gateway_for(gateway_id);
        gateway.verify_signature(body, signature)?;

        let Some(event) = gateway.parse_event(body)? else {
            return Ok(Reconciliation::Ignored);
        };

        let Some(payment) =
            db::payments::find_by_tracking_id(&self.pool, gateway_id, &event.tracking_id).await?
        else {
            tracing::warn!(
                gateway = %gateway_id,
                tracking_id = %event.tracking_id,
                event_type = %event.event_type,
                "Webhook for unknown payment, dropped"
            );
            return Ok(Reconciliation::Unmatched);
        };

        db::payments::update_status(&self.pool, &event.tracking_id, event.status, Utc::now())
            .await?;
        tracing::info!(
            gateway = %gateway_id,
            tracking_id = %event.tracking_id,
            event_type = %event.event_type,
            status = ?event.status,
            "Webhook reconciled"
        );

        let order_status = match event.status {
            PaymentRecordStatus::Completed => PaymentStatus::Paid,
            PaymentRecordStatus::Failed => PaymentStatus::Failed,
            PaymentRecordStatus::Refunded => PaymentStatus::Refunded,
            PaymentRecordStatus::Pending | PaymentRecordStatus::Processing => {
                return Ok(Reconciliation::Applied);
            }
        };

        let changed = self
            .engine
            .record_payment(&payment.order_id, order_status, Some(PaymentMethod::Online))
            .await?;
        if !changed {
            return Ok(Reconciliation::Duplicate);
        }

        if order_status == PaymentStatus::Paid {
            let order = self.engine.get(&payment.order_id).await?;
            self.publisher
                .publish(Event::PaymentSuccess {
                    restaurant_id: order.restaurant_id.clone(),
                    order_id: order.id.clone(),
                    order_number: order.order_number.clone(),
                    amount: order.total,
                })
                .await;
        }
        Ok(Reconciliation::Applied)
    }

    pub async fn payments_for_order(&self, order_id: &str) -> AppResult<Vec<Payment>> {
        db::payments::list_by_order(&self.pool, order_id).await
    }
}

#[cfg(test)]
mod tests {
    use hmac::{Hmac, Mac};
    use serde_json::json;
    use sha2::Sha256;
    use shared::{OrderSource, TableStatus};

    use super::*;
    use crate::events::MemoryPublisher;
    use crate::orders::{CartLine, CreateOrder};
    use crate::session::TableSessionCoordinator;
    use super::razorpay::RazorpayGateway;
    use super::stripe::StripeGateway;

    const STRIPE_WEBHOOK_SECRET: &str = "whsec_test";
    const RAZORPAY_WEBHOOK_SECRET: &str = "rzp_whsec_test";

    fn hmac_hex(secret: &str, payload: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    fn stripe_gateway() -> StripeGateway {
        StripeGateway::new(
            reqwest::Client::new(),
            "sk_test".to_string(),
            STRIPE_WEBHOOK_SECRET.to_string(),
        )
    }

    fn razorpay_gateway() -> RazorpayGateway {
        RazorpayGateway::new(
            reqwest::Client::new(),
            "rzp_key".to_string(),
            "rzp_secret".to_string(),
            RAZORPAY_WEBHOOK_SECRET.to_string(),
        )
    }

    fn stripe_signature(body: &[u8], age_secs: i64) -> String {
        let ts = Utc::now().timestamp() - age_secs;
        let signed = format!("{ts}.{}", std::str::from_utf8(body).unwrap());
        format!("t={ts},v1={}", hmac_hex(STRIPE_WEBHOOK_SECRET, signed.as_bytes()))
    }

    async fn setup() -> (SqlitePool, Arc<MemoryPublisher>, PaymentService) {
        let pool = db::connect_in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO restaurants (id, name, currency, tax_rate, payment_gateway_preference) \
             VALUES ('r1', 'Trattoria', 'EUR', 0.1, NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO dining_tables (id, restaurant_id, name, capacity) VALUES ('t1', 'r1', 'T1', 4)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO menu_items (id, restaurant_id, name, price, is_available, stock_quantity, low_stock_threshold, is_low_stock) \
             VALUES ('m1', 'r1', 'Margherita', 9.5, 1, NULL, 3, 0)",
        )
        .execute(&pool)
        .await
        .unwrap();
        let publisher = Arc::new(MemoryPublisher::new());
        let sessions = Arc::new(TableSessionCoordinator::new(pool.clone(), publisher.clone()));
        let engine = Arc::new(OrderEngine::new(
            pool.clone(),
            publisher.clone(),
            sessions,
        ));
        let service = PaymentService::new(
            pool.clone(),
            publisher.clone(),
            engine,
            Arc::new(stripe_gateway()),
            Arc::new(razorpay_gateway()),
        );
        (pool, publisher, service)
    }

    /// Creates an order and a pending payment record, as `create_checkout`
    /// would after a successful gateway call.
    async fn seed_pending_payment(
        pool: &SqlitePool,
        service: &PaymentService,
        gateway: GatewayId,
        tracking_id: &str,
    ) -> String {
        let order = service
            .engine
            .create(CreateOrder {
                restaurant_id: "r1".to_string(),
                table_id: Some("t1".to_string()),
                security_token: None,
                items: vec![CartLine {
                    menu_item_id: "m1".to_string(),
                    quantity: 2,
                    note: None,
                }],
                tip: 0.0,
                promo_code: None,
                source: OrderSource::Qr,
            })
            .await
            .unwrap();
        let now = Utc::now();
        db::payments::insert(
            pool,
            &Payment {
                id: Uuid::new_v4().to_string(),
                order_id: order.id.clone(),
                restaurant_id: "r1".to_string(),
                gateway,
                tracking_id: tracking_id.to_string(),
                amount: order.total,
                currency: "EUR".to_string(),
                status: PaymentRecordStatus::Pending,
                created_at: now,
                updated_at: now,
            },
        )
        .await
        .unwrap();
        order.id
    }

    #[test]
    fn gateway_selection_is_deterministic() {
        assert_eq!(select_gateway("INR", None), GatewayId::Razorpay);
        assert_eq!(select_gateway("EUR", None), GatewayId::Stripe);
        assert_eq!(select_gateway("usd", None), GatewayId::Stripe);

        // A compatible preference wins
        assert_eq!(
            select_gateway("INR", Some(GatewayId::Stripe)),
            GatewayId::Stripe
        );
        assert_eq!(
            select_gateway("INR", Some(GatewayId::Razorpay)),
            GatewayId::Razorpay
        );

        // An incompatible preference falls back to currency routing
        assert_eq!(
            select_gateway("EUR", Some(GatewayId::Razorpay)),
            GatewayId::Stripe
        );
    }

    #[test]
    fn stripe_signature_round_trip() {
        let gateway = stripe_gateway();
        let body = br#"{"type":"payment_intent.succeeded"}"#;

        gateway
            .verify_signature(body, &stripe_signature(body, 0))
            .unwrap();

        // Tampered body
        let err = gateway
            .verify_signature(b"{}", &stripe_signature(body, 0))
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidSignature(_)));

        // Replay of an old event
        let err = gateway
            .verify_signature(body, &stripe_signature(body, 600))
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidSignature(_)));

        let err = gateway.verify_signature(body, "garbage").unwrap_err();
        assert!(matches!(err, AppError::InvalidSignature(_)));
    }

    #[test]
    fn razorpay_signature_round_trip() {
        let gateway = razorpay_gateway();
        let body = br#"{"event":"payment.captured"}"#;
        let signature = hmac_hex(RAZORPAY_WEBHOOK_SECRET, body);

        gateway.verify_signature(body, &signature).unwrap();

        let err = gateway.verify_signature(b"{}", &signature).unwrap_err();
        assert!(matches!(err, AppError::InvalidSignature(_)));
    }

    #[test]
    fn stripe_events_map_to_internal_statuses() {
        let gateway = stripe_gateway();

        let body = json!({
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": "pi_123" } }
        });
        let event = gateway
            .parse_event(body.to_string().as_bytes())
            .unwrap()
            .unwrap();
        assert_eq!(event.tracking_id, "pi_123");
        assert_eq!(event.status, PaymentRecordStatus::Completed);

        let body = json!({
            "type": "charge.refunded",
            "data": { "object": { "id": "ch_1", "payment_intent": "pi_123" } }
        });
        let event = gateway
            .parse_event(body.to_string().as_bytes())
            .unwrap()
            .unwrap();
        assert_eq!(event.tracking_id, "pi_123");
        assert_eq!(event.status, PaymentRecordStatus::Refunded);

        let body = json!({ "type": "customer.created", "data": { "object": {} } });
        assert!(gateway.parse_event(body.to_string().as_bytes()).unwrap().is_none());
    }

    #[test]
    fn razorpay_events_map_to_internal_statuses() {
        let gateway = razorpay_gateway();

        let body = json!({
            "event": "payment.captured",
            "payload": { "payment": { "entity": { "id": "pay_1", "order_id": "order_123" } } }
        });
        let event = gateway
            .parse_event(body.to_string().as_bytes())
            .unwrap()
            .unwrap();
        assert_eq!(event.tracking_id, "order_123");
        assert_eq!(event.status, PaymentRecordStatus::Completed);

        let body = json!({
            "event": "payment.failed",
            "payload": { "payment": { "entity": { "id": "pay_1", "order_id": "order_123" } } }
        });
        let event = gateway
            .parse_event(body.to_string().as_bytes())
            .unwrap()
            .unwrap();
        assert_eq!(event.status, PaymentRecordStatus::Failed);

        let body = json!({ "event": "invoice.paid", "payload": {} });
        assert!(gateway.parse_event(body.to_string().as_bytes()).unwrap().is_none());
    }

    #[tokio::test]
    async fn reconcile_is_idempotent_under_redelivery() {
        let (pool, publisher, service) = setup().await;
        let order_id =
            seed_pending_payment(&pool, &service, GatewayId::Razorpay, "order_123").await;

        let body = json!({
            "event": "payment.captured",
            "payload": { "payment": { "entity": { "id": "pay_1", "order_id": "order_123" } } }
        })
        .to_string();
        let signature = hmac_hex(RAZORPAY_WEBHOOK_SECRET, body.as_bytes());

        let first = service
            .reconcile(GatewayId::Razorpay, body.as_bytes(), &signature)
            .await
            .unwrap();
        assert_eq!(first, Reconciliation::Applied);

        let order = service.engine.get(&order_id).await.unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.payment_method, Some(PaymentMethod::Online));

        // Settled payment frees the table
        let table = db::tables::find_by_id(&pool, "t1").await.unwrap().unwrap();
        assert_eq!(table.status, TableStatus::Free);

        // Redeliver the same event a few times
        for _ in 0..3 {
            let result = service
                .reconcile(GatewayId::Razorpay, body.as_bytes(), &signature)
                .await
                .unwrap();
            assert_eq!(result, Reconciliation::Duplicate);
        }

        let successes = publisher
            .topics()
            .into_iter()
            .filter(|t| *t == "payment.success")
            .count();
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn reconcile_drops_unmatched_and_rejects_bad_signatures() {
        let (_pool, _publisher, service) = setup().await;

        let body = json!({
            "event": "payment.captured",
            "payload": { "payment": { "entity": { "id": "pay_1", "order_id": "order_unknown" } } }
        })
        .to_string();

        let err = service
            .reconcile(GatewayId::Razorpay, body.as_bytes(), "deadbeef")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidSignature(_)));

        let signature = hmac_hex(RAZORPAY_WEBHOOK_SECRET, body.as_bytes());
        let result = service
            .reconcile(GatewayId::Razorpay, body.as_bytes(), &signature)
            .await
            .unwrap();
        assert_eq!(result, Reconciliation::Unmatched);
    }

    #[tokio::test]
    async fn reconcile_ignores_unrelated_event_types() {
        let (_pool, _publisher, service) = setup().await;

        let body = json!({ "event": "invoice.paid", "payload": {} }).to_string();
        let signature = hmac_hex(RAZORPAY_WEBHOOK_SECRET, body.as_bytes());
        let result = service
            .reconcile(GatewayId::Razorpay, body.as_bytes(), &signature)
            .await
            .unwrap();
        assert_eq!(result, Reconciliation::Ignored);
    }

    #[tokio::test]
    async fn failure_then_success_settles_once() {
        let (pool, _publisher, service) = setup().await;
        let order_id =
            seed_pending_payment(&pool, &service, GatewayId::Razorpay, "order_456").await;

        let failed = json!({
            "event": "payment.failed",
            "payload": { "payment": { "entity": { "id": "pay_1", "order_id": "order_456" } } }
        })
        .to_string();
        let result = service
            .reconcile(
                GatewayId::Razorpay,
                failed.as_bytes(),
                &hmac_hex(RAZORPAY_WEBHOOK_SECRET, failed.as_bytes()),
            )
            .await
            .unwrap();
        assert_eq!(result, Reconciliation::Applied);
        let order = service.engine.get(&order_id).await.unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Failed);

        // The retried payment succeeds
        let captured = json!({
            "event": "payment.captured",
            "payload": { "payment": { "entity": { "id": "pay_2", "order_id": "order_456" } } }
        })
        .to_string();
        let result = service
            .reconcile(
                GatewayId::Razorpay,
                captured.as_bytes(),
                &hmac_hex(RAZORPAY_WEBHOOK_SECRET, captured.as_bytes()),
            )
            .await
            .unwrap();
        assert_eq!(result, Reconciliation::Applied);
        let order = service.engine.get(&order_id).await.unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Paid);

        // A late failure event cannot regress the settled order
        let result = service
            .reconcile(
                GatewayId::Razorpay,
                failed.as_bytes(),
                &hmac_hex(RAZORPAY_WEBHOOK_SECRET, failed.as_bytes()),
            )
            .await
            .unwrap();
        assert_eq!(result, Reconciliation::Duplicate);
        let order = service.engine.get(&order_id).await.unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Paid);
    }
}
