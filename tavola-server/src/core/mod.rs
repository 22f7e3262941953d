//! Core server plumbing: configuration, shared state, HTTP server

pub mod config;
pub mod server;
pub mod state;

pub use config::Config;
pub use server::Server;
pub use state::AppState;
