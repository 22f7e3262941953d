//! Domain models

pub mod menu_item;
pub mod order;
pub mod payment;
pub mod restaurant;
pub mod table;

pub use menu_item::MenuItem;
pub use order::{
    Order, OrderItem, OrderSource, OrderStatus, PaymentMethod, PaymentStatus, StatusHistoryEntry,
};
pub use payment::{GatewayId, Payment, PaymentRecordStatus};
pub use restaurant::Restaurant;
pub use table::{DiningTable, TableStatus};
