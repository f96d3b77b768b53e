use serde::{Deserialize, Serialize};

use crate::serializer::{self, MessageValue};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Ping,
}

/// Control frames the server sends on its own behalf
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Pong,
    Heartbeat {
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    Shutdown {
        reason: String,
        reconnect_after_seconds: u64,
    },
    Error {
        code: String,
        message: String,
    },
}

impl ServerMessage {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn heartbeat() -> Self {
        Self::Heartbeat {
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn shutdown(reason: impl Into<String>, reconnect_after_seconds: u64) -> Self {
        Self::Shutdown {
            reason: reason.into(),
            reconnect_after_seconds,
        }
    }
}

impl From<ServerMessage> for MessageValue {
    fn from(msg: ServerMessage) -> Self {
        MessageValue::Json(serializer::serialize_serde(&msg))
    }
}
