//! Checkout endpoint

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use shared::{AppError, AppResult};
use validator::Validate;

use crate::core::AppState;
use crate::payments::gateway::CheckoutHandle;

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate(length(min = 1))]
    pub order_id: String,
}

pub async fn checkout(
    State(state): State<AppState>,
    Json(req): Json<CheckoutRequest>,
) -> AppResult<Json<CheckoutHandle>> {
    req.validate()
        .map_err(|e| AppError::validation(e.to_string()))?;
    let handle = state.payments.create_checkout(&req.order_id).await?;
    Ok(Json(handle))
}
