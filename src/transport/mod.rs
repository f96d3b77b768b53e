//! Transport abstraction for live client connections.
//!
//! A transport is the capability to push a JSON frame to one client and to
//! close the underlying socket. The registry owns transports once a
//! connection is registered; nothing outside the lifecycle layer closes them.

mod channel;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use channel::{ChannelTransport, OutboundMessage};

/// A fully serialized, decorated outbound frame. Shared across every
/// connection of a fan-out so the payload is built once.
pub type Frame = Arc<serde_json::Value>;

/// Failure on a single connection's transport
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,

    #[error("send failed: {0}")]
    Send(String),

    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}

impl TransportError {
    /// Short label used for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Send(_) => "send",
            Self::Timeout(_) => "timeout",
        }
    }
}

/// Capability interface over an underlying client socket
#[async_trait]
pub trait Transport: Send + Sync {
    /// Submit one frame. Implementations must preserve submission order.
    async fn send_json(&self, frame: Frame) -> Result<(), TransportError>;

    /// Close the underlying socket. Called at most once by the lifecycle layer.
    async fn close(&self) -> Result<(), TransportError>;
}
