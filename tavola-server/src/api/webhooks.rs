//! Gateway webhook handlers
//!
//! Must receive the raw body (not JSON) for HMAC signature verification.
//! 2xx acknowledges the delivery; 4xx on signature failure makes the
//! gateway retry, which is what we want for transient clock or config
//! problems.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use shared::{AppError, GatewayId};

use crate::core::AppState;

pub async fn stripe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    handle(&state, GatewayId::Stripe, &headers, "stripe-signature", &body).await
}

pub async fn razorpay(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    handle(
        &state,
        GatewayId::Razorpay,
        &headers,
        "x-razorpay-signature",
        &body,
    )
    .await
}

async fn handle(
    state: &AppState,
    gateway: GatewayId,
    headers: &HeaderMap,
    header_name: &str,
    body: &[u8],
) -> StatusCode {
    let signature = match headers.get(header_name).and_then(|v| v.to_str().ok()) {
        Some(s) => s,
        None => {
            tracing::warn!(%gateway, "Missing {header_name} header");
            return StatusCode::BAD_REQUEST;
        }
    };

    match state.payments.reconcile(gateway, body, signature).await {
        Ok(result) => {
            tracing::debug!(%gateway, ?result, "Webhook processed");
            StatusCode::OK
        }
        Err(AppError::InvalidSignature(e)) => {
            tracing::warn!(%gateway, error = %e, "Webhook signature verification failed");
            StatusCode::BAD_REQUEST
        }
        Err(AppError::Validation(e)) => {
            tracing::warn!(%gateway, error = %e, "Malformed webhook payload");
            StatusCode::BAD_REQUEST
        }
        Err(e) => {
            tracing::error!(%gateway, error = %e, "Webhook processing failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
