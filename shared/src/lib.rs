//! Shared types for the Tavola platform
//!
//! Domain models and the unified error type used by the order lifecycle
//! engine and its HTTP surface.

pub mod error;
pub mod models;

// Re-exports
pub use error::{AppError, AppResult};
pub use models::{
    DiningTable, GatewayId, MenuItem, Order, OrderItem, OrderSource, OrderStatus, Payment,
    PaymentMethod, PaymentRecordStatus, PaymentStatus, Restaurant, StatusHistoryEntry, TableStatus,
};
