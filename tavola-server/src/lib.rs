//! Tavola Server — restaurant order & table-session lifecycle engine
//!
//! # Module structure
//!
//! ```text
//! tavola-server/src/
//! ├── core/          # Configuration, shared state, HTTP server
//! ├── api/           # HTTP routes and handlers
//! ├── session/       # Table occupancy and per-sitting sessions
//! ├── orders/        # Order state machine and pricing
//! ├── inventory/     # Stock counters and availability
//! ├── payments/      # Gateway routing and webhook reconciliation
//! ├── events/        # Outbound event contract
//! ├── db/            # SQLite persistence layer
//! └── utils/         # Logging
//! ```

pub mod api;
pub mod core;
pub mod db;
pub mod events;
pub mod inventory;
pub mod orders;
pub mod payments;
pub mod session;
pub mod utils;

pub use crate::core::{AppState, Config, Server};
pub use utils::logger::init_logger;
