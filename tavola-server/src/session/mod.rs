//! Table Session Coordinator
//!
//! Owns table occupancy state and the session identity that groups every
//! order of one sitting. Sessions are reused, not recreated, per sitting so
//! the active-bill view can aggregate all orders since the table was
//! seated. The per-session security token defends the public order-creation
//! endpoint: nobody can order against a table whose current QR code they
//! have not scanned.

use std::sync::Arc;

use shared::{AppError, AppResult, DiningTable};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db;
use crate::events::{Event, Publisher};

/// Outcome of resolving the session for an inbound order
#[derive(Debug, Clone)]
pub struct SessionResolution {
    pub session_id: String,
    pub token: String,
    pub is_new: bool,
}

pub struct TableSessionCoordinator {
    pool: SqlitePool,
    publisher: Arc<dyn Publisher>,
}

impl TableSessionCoordinator {
    pub fn new(pool: SqlitePool, publisher: Arc<dyn Publisher>) -> Self {
        Self { pool, publisher }
    }

    /// Resolve (or mint) the session for an order against `table_id`.
    ///
    /// An active session with a token rejects mismatching presented tokens;
    /// a matching or absent token reuses the session. A table without a
    /// session gets a fresh session id and token via a conditional update —
    /// if a concurrent first order wins that race, the loser adopts the
    /// winner's session instead of minting a second one.
    pub async fn resolve_session(
        &self,
        table_id: &str,
        presented_token: Option<&str>,
    ) -> AppResult<SessionResolution> {
        let table = self.require_table(table_id).await?;

        if let Some(session_id) = table.session_id {
            Self::check_token(table.session_token.as_deref(), presented_token)?;
            return Ok(SessionResolution {
                session_id,
                token: table.session_token.unwrap_or_default(),
                is_new: false,
            });
        }

        let session_id = Uuid::new_v4().to_string();
        let token = Uuid::new_v4().simple().to_string();
        let written = db::tables::try_start_session(&self.pool, table_id, &session_id, &token).await?;
        if written > 0 {
            tracing::info!(table_id, session_id = %session_id, "New table session started");
            return Ok(SessionResolution {
                session_id,
                token,
                is_new: true,
            });
        }

        // Lost the mint race: adopt the concurrently created session.
        let table = self.require_table(table_id).await?;
        let session_id = table.session_id.ok_or_else(|| {
            AppError::database(format!("table {table_id} session vanished during resolution"))
        })?;
        Self::check_token(table.session_token.as_deref(), presented_token)?;
        tracing::debug!(table_id, session_id = %session_id, "Adopted concurrently minted session");
        Ok(SessionResolution {
            session_id,
            token: table.session_token.unwrap_or_default(),
            is_new: false,
        })
    }

    /// Mark the table occupied and link the sitting's most recent order.
    /// Idempotent for the same session.
    pub async fn attach_order(
        &self,
        table_id: &str,
        session_id: &str,
        order_id: &str,
    ) -> AppResult<()> {
        let written = db::tables::attach_order(
            &self.pool,
            table_id,
            session_id,
            order_id,
            chrono::Utc::now(),
        )
        .await?;
        if written == 0 {
            // Session changed between resolution and attach; the order keeps
            // its resolved session id and the table belongs to the new sitting.
            tracing::warn!(table_id, session_id, order_id, "Stale session on attach, skipped");
            return Ok(());
        }
        self.publish_table(table_id).await;
        Ok(())
    }

    /// Free the table after a settled payment, but only while it is still
    /// occupied by the settled sitting and every non-cancelled order of that
    /// sitting has been paid. Returns whether the table was released.
    pub async fn release_if_settled(&self, table_id: &str, session_id: &str) -> AppResult<bool> {
        let released = db::tables::release_if_settled(&self.pool, table_id, session_id).await? > 0;
        if released {
            tracing::info!(table_id, session_id, "Table released after settlement");
            self.publish_table(table_id).await;
        }
        Ok(released)
    }

    /// Administrative escape hatch: force FREE and clear the session.
    pub async fn reset(&self, table_id: &str) -> AppResult<DiningTable> {
        self.require_table(table_id).await?;
        db::tables::reset(&self.pool, table_id).await?;
        let table = self.require_table(table_id).await?;
        tracing::info!(table_id, "Table reset");
        self.publisher
            .publish(Event::TableUpdated {
                table: table.clone(),
            })
            .await;
        Ok(table)
    }

    fn check_token(expected: Option<&str>, presented: Option<&str>) -> AppResult<()> {
        if let (Some(expected), Some(presented)) = (expected, presented)
            && expected != presented
        {
            return Err(AppError::security(
                "session token mismatch — please re-scan the table code",
            ));
        }
        Ok(())
    }

    async fn require_table(&self, table_id: &str) -> AppResult<DiningTable> {
        db::tables::find_by_id(&self.pool, table_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("table {table_id}")))
    }

    async fn publish_table(&self, table_id: &str) {
        match db::tables::find_by_id(&self.pool, table_id).await {
            Ok(Some(table)) => self.publisher.publish(Event::TableUpdated { table }).await,
            Ok(None) => {}
            Err(e) => tracing::warn!(table_id, error = %e, "Failed to load table for event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemoryPublisher;
    use shared::TableStatus;

    async fn setup() -> (SqlitePool, Arc<MemoryPublisher>, TableSessionCoordinator) {
        let pool = db::connect_in_memory().await.unwrap();
        sqlx::query("INSERT INTO restaurants (id, name, currency, tax_rate) VALUES ('r1', 'Trattoria', 'EUR', 0.1)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO dining_tables (id, restaurant_id, name, capacity) VALUES ('t1', 'r1', 'T1', 4)",
        )
        .execute(&pool)
        .await
        .unwrap();
        let publisher = Arc::new(MemoryPublisher::new());
        let coordinator = TableSessionCoordinator::new(pool.clone(), publisher.clone());
        (pool, publisher, coordinator)
    }

    #[tokio::test]
    async fn mints_then_reuses_session() {
        let (_pool, _publisher, coordinator) = setup().await;

        let first = coordinator.resolve_session("t1", None).await.unwrap();
        assert!(first.is_new);

        let second = coordinator
            .resolve_session("t1", Some(&first.token))
            .await
            .unwrap();
        assert!(!second.is_new);
        assert_eq!(first.session_id, second.session_id);
    }

    #[tokio::test]
    async fn rejects_mismatching_token() {
        let (_pool, _publisher, coordinator) = setup().await;

        let first = coordinator.resolve_session("t1", None).await.unwrap();
        let err = coordinator
            .resolve_session("t1", Some("forged-token"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SecurityViolation(_)));

        // Absent token (staff flow) still reuses the sitting
        let staff = coordinator.resolve_session("t1", None).await.unwrap();
        assert_eq!(staff.session_id, first.session_id);
    }

    #[tokio::test]
    async fn unknown_table_is_not_found() {
        let (_pool, _publisher, coordinator) = setup().await;
        let err = coordinator.resolve_session("nope", None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn attach_marks_occupied_and_keeps_first_occupancy_time() {
        let (pool, publisher, coordinator) = setup().await;

        let session = coordinator.resolve_session("t1", None).await.unwrap();
        coordinator
            .attach_order("t1", &session.session_id, "o1")
            .await
            .unwrap();

        let table = db::tables::find_by_id(&pool, "t1").await.unwrap().unwrap();
        assert_eq!(table.status, TableStatus::Occupied);
        let first_occupied = table.occupied_at.unwrap();
        assert_eq!(table.session_order_id.as_deref(), Some("o1"));

        coordinator
            .attach_order("t1", &session.session_id, "o2")
            .await
            .unwrap();
        let table = db::tables::find_by_id(&pool, "t1").await.unwrap().unwrap();
        assert_eq!(table.occupied_at.unwrap(), first_occupied);
        assert_eq!(table.session_order_id.as_deref(), Some("o2"));

        assert!(publisher.topics().contains(&"table.updated"));
    }

    async fn seed_order(
        pool: &SqlitePool,
        id: &str,
        session_id: &str,
        status: &str,
        payment_status: &str,
    ) {
        sqlx::query(
            "INSERT INTO orders (id, restaurant_id, table_id, session_id, order_number, items, \
                subtotal, tax, tip, discount, total, status, payment_status, source, \
                status_history, created_at) \
             VALUES (?1, 'r1', 't1', ?2, ?1, '[]', 0, 0, 0, 0, 0, ?3, ?4, 'QR', '[]', ?5)",
        )
        .bind(id)
        .bind(session_id)
        .bind(status)
        .bind(payment_status)
        .bind(chrono::Utc::now())
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn release_waits_for_the_whole_sitting_to_settle() {
        let (pool, _publisher, coordinator) = setup().await;

        let session = coordinator.resolve_session("t1", None).await.unwrap();
        coordinator
            .attach_order("t1", &session.session_id, "o2")
            .await
            .unwrap();
        seed_order(&pool, "o1", &session.session_id, "SERVED", "UNPAID").await;
        seed_order(&pool, "o2", &session.session_id, "SERVED", "PAID").await;
        // Cancelled orders drop out of the outstanding balance
        seed_order(&pool, "o3", &session.session_id, "CANCELLED", "UNPAID").await;

        // o1 is still owed, the table stays occupied
        assert!(
            !coordinator
                .release_if_settled("t1", &session.session_id)
                .await
                .unwrap()
        );
        let table = db::tables::find_by_id(&pool, "t1").await.unwrap().unwrap();
        assert_eq!(table.status, TableStatus::Occupied);

        sqlx::query("UPDATE orders SET payment_status = 'PAID' WHERE id = 'o1'")
            .execute(&pool)
            .await
            .unwrap();

        // Another sitting's settlement never frees this table
        assert!(
            !coordinator
                .release_if_settled("t1", "some-other-session")
                .await
                .unwrap()
        );

        assert!(
            coordinator
                .release_if_settled("t1", &session.session_id)
                .await
                .unwrap()
        );
        let table = db::tables::find_by_id(&pool, "t1").await.unwrap().unwrap();
        assert_eq!(table.status, TableStatus::Free);
        assert!(table.session_id.is_none());
        assert!(table.session_token.is_none());
    }

    #[tokio::test]
    async fn reset_starts_a_fresh_session_next_time() {
        let (_pool, _publisher, coordinator) = setup().await;

        let first = coordinator.resolve_session("t1", None).await.unwrap();
        coordinator
            .attach_order("t1", &first.session_id, "o1")
            .await
            .unwrap();

        let table = coordinator.reset("t1").await.unwrap();
        assert_eq!(table.status, TableStatus::Free);

        let second = coordinator.resolve_session("t1", None).await.unwrap();
        assert!(second.is_new);
        assert_ne!(first.session_id, second.session_id);
    }
}
