//! API layer - HTTP endpoint handlers.

mod connections;
mod health;
mod metrics;
mod mode;
mod routes;

pub use connections::{broadcast, connection, send_to_user, user_connections};
pub use health::{health, stats};
pub use metrics::prometheus_metrics;
pub use mode::{get_mode, set_mode};
pub use routes::api_routes;
