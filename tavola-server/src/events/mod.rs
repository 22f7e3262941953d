//! Event Notification Contract
//!
//! The core never addresses specific subscribers. It publishes [`Event`]s
//! through an injected [`Publisher`] synchronously after — but logically
//! behind — the state mutation they describe, so a subscriber never
//! observes an event for a state it cannot read back. Delivery beyond the
//! process boundary (kitchen displays, dashboards, the ordering customer)
//! is the transport's problem, not the core's.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};
use shared::{DiningTable, Order, OrderStatus, PaymentStatus};
use tokio::sync::broadcast;

/// State-change notification published by the lifecycle engine
#[derive(Debug, Clone)]
pub enum Event {
    OrderCreated {
        order: Order,
    },
    OrderStatusChanged {
        restaurant_id: String,
        order_id: String,
        order_number: String,
        status: OrderStatus,
        table_name: Option<String>,
    },
    LowStock {
        restaurant_id: String,
        item_id: String,
        name: String,
        remaining: i64,
    },
    OutOfStock {
        restaurant_id: String,
        item_id: String,
        name: String,
    },
    BackInStock {
        restaurant_id: String,
        item_id: String,
        name: String,
        remaining: i64,
    },
    TableUpdated {
        table: DiningTable,
    },
    PaymentSuccess {
        restaurant_id: String,
        order_id: String,
        order_number: String,
        amount: f64,
    },
    PaymentConfirmed {
        restaurant_id: String,
        order_id: String,
        status: PaymentStatus,
        amount: f64,
    },
}

impl Event {
    pub fn topic(&self) -> &'static str {
        match self {
            Event::OrderCreated { .. } => "order.created",
            Event::OrderStatusChanged { .. } => "order.status-changed",
            Event::LowStock { .. } => "inventory.low-stock",
            Event::OutOfStock { .. } => "inventory.out-of-stock",
            Event::BackInStock { .. } => "inventory.back-in-stock",
            Event::TableUpdated { .. } => "table.updated",
            Event::PaymentSuccess { .. } => "payment.success",
            Event::PaymentConfirmed { .. } => "payment.confirmed",
        }
    }

    /// Restaurant-scoped subscriber key (every topic carries one)
    pub fn restaurant_id(&self) -> &str {
        match self {
            Event::OrderCreated { order } => &order.restaurant_id,
            Event::OrderStatusChanged { restaurant_id, .. }
            | Event::LowStock { restaurant_id, .. }
            | Event::OutOfStock { restaurant_id, .. }
            | Event::BackInStock { restaurant_id, .. }
            | Event::PaymentSuccess { restaurant_id, .. }
            | Event::PaymentConfirmed { restaurant_id, .. } => restaurant_id,
            Event::TableUpdated { table } => &table.restaurant_id,
        }
    }

    /// Order-scoped subscriber key, for topics also delivered per order
    pub fn order_id(&self) -> Option<&str> {
        match self {
            Event::OrderStatusChanged { order_id, .. }
            | Event::PaymentSuccess { order_id, .. }
            | Event::PaymentConfirmed { order_id, .. } => Some(order_id),
            _ => None,
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            Event::OrderCreated { order } => json!(order),
            Event::OrderStatusChanged {
                order_id,
                order_number,
                status,
                table_name,
                ..
            } => json!({
                "order_id": order_id,
                "order_number": order_number,
                "status": status,
                "table_name": table_name,
            }),
            Event::LowStock {
                item_id,
                name,
                remaining,
                ..
            }
            | Event::BackInStock {
                item_id,
                name,
                remaining,
                ..
            } => json!({ "item_id": item_id, "name": name, "remaining": remaining }),
            Event::OutOfStock { item_id, name, .. } => {
                json!({ "item_id": item_id, "name": name, "remaining": 0 })
            }
            Event::TableUpdated { table } => json!(table),
            Event::PaymentSuccess {
                order_id,
                order_number,
                amount,
                ..
            } => json!({ "order_id": order_id, "order_number": order_number, "amount": amount }),
            Event::PaymentConfirmed {
                order_id,
                status,
                amount,
                ..
            } => json!({ "order_id": order_id, "status": status, "amount": amount }),
        }
    }
}

/// Outbound publishing seam injected into the core components.
///
/// Publishing is fire-and-forget: a lost notification must never roll back
/// or fail the state change it describes.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, event: Event);
}

/// Fan-out over a bounded broadcast channel.
///
/// The real-time transport subscribes on the receiver side and routes each
/// event to its restaurant-scoped (and, where present, order-scoped)
/// subscriber groups.
pub struct BroadcastPublisher {
    tx: broadcast::Sender<Event>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl Publisher for BroadcastPublisher {
    async fn publish(&self, event: Event) {
        let topic = event.topic();
        match self.tx.send(event) {
            Ok(n) => tracing::debug!(topic, subscribers = n, "Event published"),
            Err(_) => tracing::debug!(topic, "Event published with no subscribers"),
        }
    }
}

/// Capturing publisher for tests: records every event in order.
#[derive(Default)]
pub struct MemoryPublisher {
    events: Mutex<Vec<Event>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("publisher lock poisoned").clone()
    }

    pub fn topics(&self) -> Vec<&'static str> {
        self.events().iter().map(Event::topic).collect()
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, event: Event) {
        self.events
            .lock()
            .expect("publisher lock poisoned")
            .push(event);
    }
}
