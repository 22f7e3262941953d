//! HTTP API routes

pub mod health;
pub mod orders;
pub mod payments;
pub mod tables;
pub mod webhooks;

use axum::routing::{get, patch, post};
use axum::Router;

use crate::core::AppState;

/// Create the combined router
pub fn create_router(state: AppState) -> Router {
    let orders = Router::new()
        .route("/api/orders", post(orders::create).get(orders::list))
        .route("/api/orders/{id}", get(orders::get))
        .route("/api/orders/{id}/status", patch(orders::change_status))
        .route(
            "/api/orders/{id}/payment-status",
            patch(orders::change_payment_status),
        )
        .route("/api/orders/{id}/cancel", post(orders::cancel))
        .route("/api/orders/{id}/payments", get(orders::list_payments));

    let tables = Router::new()
        .route("/api/tables", get(tables::list))
        .route("/api/tables/{id}/bill", get(tables::bill))
        .route("/api/tables/{id}/reset", post(tables::reset));

    let payments = Router::new().route("/api/payments/checkout", post(payments::checkout));

    // Gateway webhooks (signature-verified, raw body)
    let webhooks = Router::new()
        .route("/api/webhooks/stripe", post(webhooks::stripe))
        .route("/api/webhooks/razorpay", post(webhooks::razorpay));

    Router::new()
        .route("/health", get(health::health_check))
        .merge(orders)
        .merge(tables)
        .merge(payments)
        .merge(webhooks)
        .with_state(state)
}
