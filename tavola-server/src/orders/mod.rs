//! Order State Machine
//!
//! Turns a cart into a durable order and walks it through the status
//! transition table. A transition is the unit of at-most-once change: the
//! status write is a compare-and-swap on the previous status, and only the
//! request that wins it runs the side effects (inventory on SERVED and on
//! cancellation-after-serve, table release on settlement) and publishes the
//! status-changed event. Side effects are decoupled from the primary state
//! change — their failure is logged, never rolled back into the committed
//! status.

pub mod money;


use std::sync::Arc;

use chrono::{Duration, Utc};
use shared::{
    AppError, AppResult, Order, OrderItem, OrderSource, OrderStatus, PaymentMethod, PaymentStatus,
    StatusHistoryEntry,
};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db;
use crate::events::{Event, Publisher};
use crate::inventory::{InventoryLedger, StockRequest};
use crate::session::TableSessionCoordinator;

/// Grace window for unauthenticated customer cancellations
const CUSTOMER_CANCEL_GRACE_MINUTES: i64 = 5;

/// Actor recorded for customer-initiated changes
const CUSTOMER_ACTOR: &str = "customer";

/// Cart line as submitted by the client
#[derive(Debug, Clone)]
pub struct CartLine {
    pub menu_item_id: String,
    pub quantity: i64,
    pub note: Option<String>,
}

/// Checkout request for a new order
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub restaurant_id: String,
    pub table_id: Option<String>,
    /// Per-session secret from the table's QR payload (scan-to-order flow)
    pub security_token: Option<String>,
    pub items: Vec<CartLine>,
    pub tip: f64,
    pub promo_code: Option<String>,
    pub source: OrderSource,
}

/// Aggregated view of all orders in the table's current sitting
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionBill {
    pub table_id: String,
    pub session_id: String,
    pub orders: Vec<Order>,
    /// Sum of non-cancelled order totals
    pub total: f64,
    /// Sum of settled order totals
    pub paid: f64,
    pub due: f64,
}

pub struct OrderEngine {
    pool: SqlitePool,
    publisher: Arc<dyn Publisher>,
    sessions: Arc<TableSessionCoordinator>,
    inventory: InventoryLedger,
}

impl OrderEngine {
    pub fn new(
        pool: SqlitePool,
        publisher: Arc<dyn Publisher>,
        sessions: Arc<TableSessionCoordinator>,
    ) -> Self {
        let inventory = InventoryLedger::new(pool.clone(), publisher.clone());
        Self {
            pool,
            publisher,
            sessions,
            inventory,
        }
    }

    pub fn inventory(&self) -> &InventoryLedger {
        &self.inventory
    }

    /// Create a durable order in PENDING from a cart.
    ///
    /// Line items are snapshotted from the live menu at this moment; later
    /// menu edits never alter the order. Availability is a read-only gate,
    /// stock is not deducted until the order is served.
    pub async fn create(&self, req: CreateOrder) -> AppResult<Order> {
        if req.items.is_empty() {
            return Err(AppError::validation("order must contain at least one item"));
        }

        let restaurant = db::restaurants::find_by_id(&self.pool, &req.restaurant_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("restaurant {}", req.restaurant_id)))?;

        // Session resolution happens before anything is written: a token
        // mismatch must not leave an order behind.
        let session = match &req.table_id {
            Some(table_id) => Some(
                self.sessions
                    .resolve_session(table_id, req.security_token.as_deref())
                    .await?,
            ),
            None => None,
        };

        let mut items = Vec::with_capacity(req.items.len());
        for line in &req.items {
            let menu_item = db::menu_items::find_by_id(&self.pool, &line.menu_item_id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("menu item {}", line.menu_item_id)))?;
            let item = OrderItem {
                menu_item_id: menu_item.id,
                name: menu_item.name,
                price: menu_item.price,
                quantity: line.quantity,
                note: line.note.clone(),
            };
            money::validate_item(&item)?;
            items.push(item);
        }

        self.inventory
            .check_availability(&stock_requests(&items))
            .await?;

        let totals = money::compute_totals(
            &items,
            restaurant.tax_rate,
            req.tip,
            req.promo_code.as_deref(),
        )?;

        let now = Utc::now();
        let sequence = db::orders::next_order_number(&self.pool, &req.restaurant_id).await?;
        let order_number = format!("ORD{}-{}", now.format("%Y%m%d"), 1000 + sequence);

        let order = Order {
            id: Uuid::new_v4().to_string(),
            restaurant_id: req.restaurant_id,
            table_id: req.table_id.clone(),
            session_id: session.as_ref().map(|s| s.session_id.clone()),
            order_number,
            items,
            subtotal: totals.subtotal,
            tax: totals.tax,
            tip: totals.tip,
            discount: totals.discount,
            total: totals.total,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            payment_method: None,
            source: req.source,
            status_history: vec![StatusHistoryEntry {
                status: OrderStatus::Pending,
                actor: "system".to_string(),
                reason: None,
                at: now,
            }],
            created_at: now,
            accepted_at: None,
            preparing_at: None,
            ready_at: None,
            served_at: None,
            cancelled_at: None,
            cancel_reason: None,
        };

        db::orders::insert(&self.pool, &order).await?;
        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = order.total,
            "Order created"
        );

        if let (Some(table_id), Some(session)) = (&req.table_id, &session)
            && let Err(e) = self
                .sessions
                .attach_order(table_id, &session.session_id, &order.id)
                .await
        {
            // The order exists; occupancy bookkeeping must not undo it.
            tracing::error!(order_id = %order.id, error = %e, "Failed to attach order to table");
        }

        self.publisher
            .publish(Event::OrderCreated {
                order: order.clone(),
            })
            .await;

        Ok(order)
    }

    pub async fn get(&self, order_id: &str) -> AppResult<Order> {
        self.require_order(order_id).await
    }

    pub async fn list(
        &self,
        restaurant_id: &str,
        status: Option<OrderStatus>,
    ) -> AppResult<Vec<Order>> {
        db::orders::list(&self.pool, restaurant_id, status).await
    }

    /// Move an order to `new_status`, stamping the transition and appending
    /// to the status history. Exactly one concurrent caller wins the CAS;
    /// everyone else gets `InvalidTransition` against the settled status.
    pub async fn transition(
        &self,
        order_id: &str,
        new_status: OrderStatus,
        actor: &str,
        reason: Option<String>,
    ) -> AppResult<Order> {
        let order = self.require_order(order_id).await?;
        if !order.status.can_transition_to(new_status) {
            return Err(AppError::InvalidTransition {
                from: order.status,
                to: new_status,
            });
        }

        let now = Utc::now();
        let mut history = order.status_history.clone();
        history.push(StatusHistoryEntry {
            status: new_status,
            actor: actor.to_string(),
            reason: reason.clone(),
            at: now,
        });
        let history_json = serde_json::to_string(&history)?;

        let written = db::orders::transition(
            &self.pool,
            order_id,
            order.status,
            new_status,
            now,
            &history_json,
            reason.as_deref(),
        )
        .await?;
        if written == 0 {
            // Lost the race; report against whatever actually committed.
            let current = self.require_order(order_id).await?;
            return Err(AppError::InvalidTransition {
                from: current.status,
                to: new_status,
            });
        }

        tracing::info!(
            order_id,
            from = %order.status,
            to = %new_status,
            actor,
            "Order status changed"
        );

        // Secondary effects are decoupled from the committed status change.
        let requests = stock_requests(&order.items);
        if new_status == OrderStatus::Served {
            if let Err(e) = self.inventory.deduct(&requests).await {
                tracing::error!(order_id, error = %e, "Inventory deduction failed after serve");
            }
        } else if new_status == OrderStatus::Cancelled && order.served_at.is_some() {
            if let Err(e) = self.inventory.restore(&requests).await {
                tracing::error!(order_id, error = %e, "Inventory restore failed after cancel");
            }
        }

        let updated = self.require_order(order_id).await?;
        let table_name = match &updated.table_id {
            Some(table_id) => db::tables::find_by_id(&self.pool, table_id)
                .await?
                .map(|t| t.name),
            None => None,
        };
        self.publisher
            .publish(Event::OrderStatusChanged {
                restaurant_id: updated.restaurant_id.clone(),
                order_id: updated.id.clone(),
                order_number: updated.order_number.clone(),
                status: updated.status,
                table_name,
            })
            .await;

        Ok(updated)
    }

    /// Cancel an order.
    ///
    /// Staff (an `actor` is present) may cancel whenever the transition
    /// table allows it. The unauthenticated customer path is additionally
    /// limited to a grace window after creation.
    pub async fn cancel(
        &self,
        order_id: &str,
        actor: Option<&str>,
        reason: String,
    ) -> AppResult<Order> {
        if let Some(actor) = actor {
            return self
                .transition(order_id, OrderStatus::Cancelled, actor, Some(reason))
                .await;
        }

        let order = self.require_order(order_id).await?;
        if order.status.is_terminal() {
            return Err(AppError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Cancelled,
            });
        }
        let age = Utc::now().signed_duration_since(order.created_at);
        if age > Duration::minutes(CUSTOMER_CANCEL_GRACE_MINUTES) {
            return Err(AppError::validation(
                "the cancellation window has passed — please ask the staff",
            ));
        }
        self.transition(order_id, OrderStatus::Cancelled, CUSTOMER_ACTOR, Some(reason))
            .await
    }

    /// Record a payment outcome on the order.
    ///
    /// Returns whether anything changed; a PAID order stays PAID (except
    /// for refunds), which makes redelivered gateway webhooks no-ops. A
    /// fresh settlement releases the table if this order is still the
    /// sitting's latest.
    pub async fn record_payment(
        &self,
        order_id: &str,
        payment_status: PaymentStatus,
        method: Option<PaymentMethod>,
    ) -> AppResult<bool> {
        let order = self.require_order(order_id).await?;
        let changed =
            db::orders::set_payment_status(&self.pool, order_id, payment_status, method).await?;
        if !changed {
            tracing::debug!(order_id, status = ?payment_status, "Payment status unchanged");
            return Ok(false);
        }

        tracing::info!(order_id, status = ?payment_status, "Payment status recorded");
        self.publisher
            .publish(Event::PaymentConfirmed {
                restaurant_id: order.restaurant_id.clone(),
                order_id: order.id.clone(),
                status: payment_status,
                amount: order.total,
            })
            .await;

        if payment_status == PaymentStatus::Paid
            && let (Some(table_id), Some(session_id)) = (&order.table_id, &order.session_id)
            && let Err(e) = self.sessions.release_if_settled(table_id, session_id).await
        {
            tracing::error!(order_id, error = %e, "Table release failed after settlement");
        }

        Ok(true)
    }

    /// The active bill: every order of the table's current sitting plus
    /// aggregate totals.
    pub async fn session_bill(&self, table_id: &str) -> AppResult<SessionBill> {
        let table = db::tables::find_by_id(&self.pool, table_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("table {table_id}")))?;
        let session_id = table
            .session_id
            .ok_or_else(|| AppError::validation("table has no active session"))?;

        let orders = db::orders::list_by_session(&self.pool, &session_id).await?;
        let billable: Vec<&Order> = orders
            .iter()
            .filter(|o| o.status != OrderStatus::Cancelled)
            .collect();
        let total = money::sum(billable.iter().map(|o| o.total));
        let paid = money::sum(
            billable
                .iter()
                .filter(|o| o.payment_status.is_settled())
                .map(|o| o.total),
        );
        let due = money::sum([total, -paid]).max(0.0);

        Ok(SessionBill {
            table_id: table_id.to_string(),
            session_id,
            orders,
            total,
            paid,
            due,
        })
    }

    async fn require_order(&self, order_id: &str) -> AppResult<Order> {
        db::orders::find_by_id(&self.pool, order_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("order {order_id}")))
    }
}

fn stock_requests(items: &[OrderItem]) -> Vec<StockRequest> {
    items
        .iter()
        .map(|item| StockRequest {
            menu_item_id: item.menu_item_id.clone(),
            quantity: item.quantity,
        })
        .collect()
}
