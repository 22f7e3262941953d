//! Shared application state
//!
//! Wires the pool, the event publisher and the lifecycle components
//! together once at startup; handlers receive clones.

use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;

use crate::core::Config;
use crate::db;
use crate::events::{BroadcastPublisher, Publisher};
use crate::orders::OrderEngine;
use crate::payments::razorpay::RazorpayGateway;
use crate::payments::stripe::StripeGateway;
use crate::payments::PaymentService;
use crate::session::TableSessionCoordinator;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub pool: SqlitePool,
    /// Event fan-out; the real-time transport subscribes here
    pub publisher: Arc<BroadcastPublisher>,
    pub sessions: Arc<TableSessionCoordinator>,
    pub engine: Arc<OrderEngine>,
    pub payments: Arc<PaymentService>,
}

impl AppState {
    /// Connect to the database, run migrations and build the component graph.
    pub async fn initialize(config: Config) -> Result<Self> {
        let pool = db::connect(&config.database_path).await?;
        Ok(Self::with_pool(config, pool))
    }

    /// Build state over an existing pool (tests use an in-memory one).
    pub fn with_pool(config: Config, pool: SqlitePool) -> Self {
        let publisher = Arc::new(BroadcastPublisher::new(config.event_channel_capacity));
        let dyn_publisher: Arc<dyn Publisher> = publisher.clone();

        let sessions = Arc::new(TableSessionCoordinator::new(
            pool.clone(),
            dyn_publisher.clone(),
        ));
        let engine = Arc::new(OrderEngine::new(
            pool.clone(),
            dyn_publisher.clone(),
            sessions.clone(),
        ));

        let http = reqwest::Client::new();
        let payments = Arc::new(PaymentService::new(
            pool.clone(),
            dyn_publisher,
            engine.clone(),
            Arc::new(StripeGateway::new(
                http.clone(),
                config.stripe_secret_key.clone(),
                config.stripe_webhook_secret.clone(),
            )),
            Arc::new(RazorpayGateway::new(
                http,
                config.razorpay_key_id.clone(),
                config.razorpay_key_secret.clone(),
                config.razorpay_webhook_secret.clone(),
            )),
        ));

        Self {
            config,
            pool,
            publisher,
            sessions,
            engine,
            payments,
        }
    }
}
