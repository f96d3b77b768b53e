//! Operating modes and per-mode payload decoration.
//!
//! The mode is an externally supplied value (configuration or the admin
//! API). It is read at send time; the controller never changes it on its
//! own.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::serializer::WireEnum;

/// Declared type written into every frame while degraded
pub const DEGRADED_MESSAGE_TYPE: &str = "degraded_service";

/// `manager_type` marker written into every frame in emergency mode
pub const EMERGENCY_MANAGER_TYPE: &str = "emergency_fallback";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ManagerMode {
    /// Normal operation, no decoration
    #[default]
    Unified,
    /// Normal delivery for a deliberately partitioned registry
    Isolated,
    /// Reduced guarantee; frames carry `emergency_mode` and `manager_type`
    Emergency,
    /// Reduced functionality; frame type forced to `degraded_service`
    Degraded,
}

impl ManagerMode {
    pub const ALL: [ManagerMode; 4] = [
        ManagerMode::Unified,
        ManagerMode::Isolated,
        ManagerMode::Emergency,
        ManagerMode::Degraded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unified => "unified",
            Self::Isolated => "isolated",
            Self::Emergency => "emergency",
            Self::Degraded => "degraded",
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Unified => 0,
            Self::Isolated => 1,
            Self::Emergency => 2,
            Self::Degraded => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Isolated,
            2 => Self::Emergency,
            3 => Self::Degraded,
            _ => Self::Unified,
        }
    }

    /// Apply this mode's decoration to an outbound frame
    pub fn decorate(&self, frame: &mut Map<String, Value>) {
        match self {
            Self::Unified | Self::Isolated => {}
            Self::Emergency => {
                frame.insert("emergency_mode".to_string(), Value::Bool(true));
                frame.insert(
                    "manager_type".to_string(),
                    Value::String(EMERGENCY_MANAGER_TYPE.to_string()),
                );
            }
            Self::Degraded => {
                frame.insert(
                    "type".to_string(),
                    Value::String(DEGRADED_MESSAGE_TYPE.to_string()),
                );
                frame.insert("degraded_mode".to_string(), Value::Bool(true));
            }
        }
    }
}

impl fmt::Display for ManagerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl WireEnum for ManagerMode {
    fn variant_name(&self) -> &'static str {
        match self {
            Self::Unified => "UNIFIED",
            Self::Isolated => "ISOLATED",
            Self::Emergency => "EMERGENCY",
            Self::Degraded => "DEGRADED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown manager mode '{0}' (expected unified, isolated, emergency or degraded)")]
pub struct ParseModeError(String);

impl FromStr for ManagerMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unified" => Ok(Self::Unified),
            "isolated" => Ok(Self::Isolated),
            "emergency" => Ok(Self::Emergency),
            "degraded" => Ok(Self::Degraded),
            other => Err(ParseModeError(other.to_string())),
        }
    }
}

/// Holds the current operating mode
#[derive(Debug)]
pub struct ModeController {
    mode: AtomicU8,
}

impl ModeController {
    pub fn new(mode: ManagerMode) -> Self {
        Self {
            mode: AtomicU8::new(mode.as_u8()),
        }
    }

    pub fn current(&self) -> ManagerMode {
        ManagerMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    /// Replace the current mode, returning the previous one
    pub fn set_mode(&self, mode: ManagerMode) -> ManagerMode {
        let previous = ManagerMode::from_u8(self.mode.swap(mode.as_u8(), Ordering::AcqRel));
        if previous != mode {
            tracing::warn!(from = %previous, to = %mode, "Manager mode changed");
        }
        previous
    }

    /// Decorate a frame according to the mode active right now
    pub fn decorate(&self, frame: &mut Map<String, Value>) -> ManagerMode {
        let mode = self.current();
        mode.decorate(frame);
        mode
    }
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new(ManagerMode::default())
    }
}
