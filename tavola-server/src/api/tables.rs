//! Table and session endpoints

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use shared::{AppResult, DiningTable};

use crate::core::AppState;
use crate::db;
use crate::orders::SessionBill;

#[derive(Debug, Deserialize)]
pub struct ListTablesQuery {
    pub restaurant_id: String,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListTablesQuery>,
) -> AppResult<Json<Vec<DiningTable>>> {
    let tables = db::tables::list_by_restaurant(&state.pool, &query.restaurant_id).await?;
    Ok(Json(tables))
}

/// The active bill for the table's current sitting
pub async fn bill(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<SessionBill>> {
    Ok(Json(state.engine.session_bill(&id).await?))
}

/// Staff escape hatch: force the table FREE and drop its session
pub async fn reset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<DiningTable>> {
    Ok(Json(state.sessions.reset(&id).await?))
}
