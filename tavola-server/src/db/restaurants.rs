//! Restaurant read access (collaborator interface)

use shared::{AppResult, Restaurant};
use sqlx::SqlitePool;

pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<Restaurant>> {
    let restaurant = sqlx::query_as::<_, Restaurant>(
        "SELECT id, name, currency, tax_rate, payment_gateway_preference
         FROM restaurants WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(restaurant)
}
