//! Order endpoints

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use shared::{AppError, AppResult, Order, OrderSource, OrderStatus, Payment, PaymentMethod, PaymentStatus};
use validator::Validate;

use crate::core::AppState;
use crate::orders::{CartLine, CreateOrder};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1))]
    pub restaurant_id: String,
    pub table_id: Option<String>,
    pub security_token: Option<String>,
    #[validate(length(min = 1, message = "order must contain at least one item"))]
    #[validate(nested)]
    pub items: Vec<OrderItemRequest>,
    #[serde(default)]
    pub tip: f64,
    pub promo_code: Option<String>,
    #[serde(default)]
    pub source: OrderSource,
}

#[derive(Debug, Deserialize, serde::Serialize, Validate)]
pub struct OrderItemRequest {
    #[validate(length(min = 1))]
    pub menu_item_id: String,
    #[validate(range(min = 1))]
    pub quantity: i64,
    pub note: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateOrderRequest>,
) -> AppResult<(StatusCode, Json<Order>)> {
    req.validate()
        .map_err(|e| AppError::validation(e.to_string()))?;

    let order = state
        .engine
        .create(CreateOrder {
            restaurant_id: req.restaurant_id,
            table_id: req.table_id,
            security_token: req.security_token,
            items: req
                .items
                .into_iter()
                .map(|item| CartLine {
                    menu_item_id: item.menu_item_id,
                    quantity: item.quantity,
                    note: item.note,
                })
                .collect(),
            tip: req.tip,
            promo_code: req.promo_code,
            source: req.source,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub restaurant_id: String,
    pub status: Option<OrderStatus>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> AppResult<Json<Vec<Order>>> {
    let orders = state
        .engine
        .list(&query.restaurant_id, query.status)
        .await?;
    Ok(Json(orders))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Order>> {
    Ok(Json(state.engine.get(&id).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangeStatusRequest {
    pub status: OrderStatus,
    #[validate(length(min = 1))]
    pub actor: String,
    pub reason: Option<String>,
}

pub async fn change_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChangeStatusRequest>,
) -> AppResult<Json<Order>> {
    req.validate()
        .map_err(|e| AppError::validation(e.to_string()))?;
    let order = state
        .engine
        .transition(&id, req.status, &req.actor, req.reason)
        .await?;
    Ok(Json(order))
}

#[derive(Debug, Deserialize)]
pub struct ChangePaymentStatusRequest {
    pub payment_status: PaymentStatus,
    pub method: Option<PaymentMethod>,
}

/// Manual payment recording (cash/card at the counter)
pub async fn change_payment_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChangePaymentStatusRequest>,
) -> AppResult<Json<Order>> {
    state
        .engine
        .record_payment(&id, req.payment_status, req.method)
        .await?;
    Ok(Json(state.engine.get(&id).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CancelRequest {
    /// Absent for the unauthenticated customer flow
    pub actor: Option<String>,
    #[validate(length(min = 1))]
    pub reason: String,
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CancelRequest>,
) -> AppResult<Json<Order>> {
    req.validate()
        .map_err(|e| AppError::validation(e.to_string()))?;
    let order = state
        .engine
        .cancel(&id, req.actor.as_deref(), req.reason)
        .await?;
    Ok(Json(order))
}

pub async fn list_payments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Payment>>> {
    Ok(Json(state.payments.payments_for_order(&id).await?))
}
