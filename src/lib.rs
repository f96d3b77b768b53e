// Core: registry, modes, delivery
pub mod connection_manager;
pub mod delivery;
pub mod lifecycle;
pub mod manager;
pub mod mode;
pub mod serializer;
pub mod transport;

// Shared infrastructure
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Application layer
pub mod api;
pub mod server;
pub mod websocket;

// Supporting modules
pub mod shutdown;
pub mod tasks;

#[cfg(test)]
mod test_support;

pub use manager::UnifiedWebSocketManager;
