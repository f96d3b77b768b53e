//! Channel-backed transport used by the WebSocket handler.
//!
//! The socket writer task owns the receiving half and turns each
//! [`OutboundMessage`] into a text frame, so writes to one socket never
//! block writes to another.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::{Frame, Transport, TransportError};

/// Messages consumed by a socket writer task
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// A JSON frame to write as a text message
    Frame(Frame),
    /// Ask the writer to send a close frame and stop
    Close,
}

impl OutboundMessage {
    /// Convert to a JSON string for the wire. `None` for control messages.
    pub fn to_json(&self) -> Option<Result<String, serde_json::Error>> {
        match self {
            Self::Frame(frame) => Some(serde_json::to_string(frame.as_ref())),
            Self::Close => None,
        }
    }
}

pub struct ChannelTransport {
    sender: mpsc::Sender<OutboundMessage>,
    closed: AtomicBool,
}

impl ChannelTransport {
    pub fn new(sender: mpsc::Sender<OutboundMessage>) -> Self {
        Self {
            sender,
            closed: AtomicBool::new(false),
        }
    }

    /// Create a transport together with the receiver a writer task drains
    pub fn pair(buffer: usize) -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.sender.is_closed()
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send_json(&self, frame: Frame) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        self.sender
            .send(OutboundMessage::Frame(frame))
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // Never waits on the writer: a stalled socket must not hold up removal.
        // The writer also stops once the last sender is dropped with the connection.
        match self.sender.try_send(OutboundMessage::Close) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                Err(TransportError::Send("writer backlog full, close not queued".to_string()))
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Socket writer already stopped before close");
                Ok(())
            }
        }
    }
}
