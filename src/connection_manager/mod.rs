//! Connection registry for live client connections
//!
//! This module provides:
//! - Connection identity and handle types
//! - The registry mapping connection IDs and users to handles
//! - Connection limits and statistics

mod registry;
mod stats;
mod types;

pub use registry::{ConnectionRegistry, UserConnections};
pub use stats::{ConnectionInfo, ConnectionStats, UserConnectionInfo};
pub use types::{
    Connection, ConnectionError, ConnectionId, ConnectionLimits, ConnectionRecord, UserId,
};
