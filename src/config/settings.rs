use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Deserializer};
use std::env;
use std::time::Duration;

use crate::connection_manager::ConnectionLimits;
use crate::delivery::{DeliveryConfig, DEFAULT_MAX_CONCURRENT_SENDS};
use crate::mode::ManagerMode;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub delivery: DeliverySettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Heartbeat interval in seconds (server sends heartbeat frame)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
    /// Connection timeout in seconds (disconnect if no activity)
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
    /// Cleanup task interval in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
    /// Outbound frames buffered per socket before sends start failing
    #[serde(default = "default_channel_buffer_size")]
    pub channel_buffer_size: usize,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_max_connections_per_user")]
    pub max_connections_per_user: usize,
}

fn default_heartbeat_interval() -> u64 {
    30 // 30 seconds
}

fn default_connection_timeout() -> u64 {
    120 // 2 minutes
}

fn default_cleanup_interval() -> u64 {
    60 // 1 minute
}

fn default_channel_buffer_size() -> usize {
    32
}

fn default_max_connections() -> usize {
    10000
}

fn default_max_connections_per_user() -> usize {
    10
}

impl WebSocketConfig {
    pub fn limits(&self) -> ConnectionLimits {
        ConnectionLimits {
            max_connections: self.max_connections,
            max_connections_per_user: self.max_connections_per_user,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliverySettings {
    /// Initial operating mode
    #[serde(default, deserialize_with = "deserialize_mode")]
    pub mode: ManagerMode,
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    #[serde(default = "default_wait_check_interval_ms")]
    pub wait_check_interval_ms: u64,
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
    #[serde(default = "default_max_concurrent_sends")]
    pub max_concurrent_sends: usize,
}

fn default_send_timeout_ms() -> u64 {
    5000
}

fn default_wait_check_interval_ms() -> u64 {
    100
}

fn default_wait_timeout_ms() -> u64 {
    5000
}

fn default_max_concurrent_sends() -> usize {
    DEFAULT_MAX_CONCURRENT_SENDS
}

/// Accept any casing ("emergency", "EMERGENCY")
fn deserialize_mode<'de, D>(deserializer: D) -> Result<ManagerMode, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

impl DeliverySettings {
    pub fn delivery_config(&self) -> DeliveryConfig {
        DeliveryConfig {
            send_timeout: Duration::from_millis(self.send_timeout_ms),
            check_interval: Duration::from_millis(self.wait_check_interval_ms),
            wait_timeout: Duration::from_millis(self.wait_timeout_ms),
            max_concurrent_sends: self.max_concurrent_sends,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    pub key: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8081)?
            .set_default("websocket.heartbeat_interval", 30)?
            .set_default("websocket.connection_timeout", 120)?
            .set_default("websocket.cleanup_interval", 60)?
            .set_default("delivery.mode", "unified")?
            .set_default("logging.format", "text")?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // SERVER__PORT, JWT__SECRET, DELIVERY__MODE, DELIVERY__SEND_TIMEOUT_MS, etc.
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: default_heartbeat_interval(),
            connection_timeout: default_connection_timeout(),
            cleanup_interval: default_cleanup_interval(),
            channel_buffer_size: default_channel_buffer_size(),
            max_connections: default_max_connections(),
            max_connections_per_user: default_max_connections_per_user(),
        }
    }
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            mode: ManagerMode::default(),
            send_timeout_ms: default_send_timeout_ms(),
            wait_check_interval_ms: default_wait_check_interval_ms(),
            wait_timeout_ms: default_wait_timeout_ms(),
            max_concurrent_sends: default_max_concurrent_sends(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8081);

        let websocket = WebSocketConfig::default();
        assert_eq!(websocket.limits().max_connections_per_user, 10);

        let delivery = DeliverySettings::default().delivery_config();
        assert_eq!(delivery.send_timeout, Duration::from_secs(5));
        assert_eq!(delivery.check_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_deserialize_from_layered_sources() {
        let settings: Settings = Config::builder()
            .set_default("server.port", 9000)
            .unwrap()
            .set_default("jwt.secret", "secret")
            .unwrap()
            .set_default("delivery.mode", "EMERGENCY")
            .unwrap()
            .set_default("delivery.wait_check_interval_ms", 25)
            .unwrap()
            .set_default("logging.format", "json")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.server_addr(), "0.0.0.0:9000");
        assert_eq!(settings.delivery.mode, ManagerMode::Emergency);
        assert_eq!(
            settings.delivery.delivery_config().check_interval,
            Duration::from_millis(25)
        );
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert!(settings.api.key.is_none());
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let result: Result<Settings, _> = Config::builder()
            .set_default("server.port", 9000)
            .unwrap()
            .set_default("jwt.secret", "secret")
            .unwrap()
            .set_default("delivery.mode", "chaotic")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize();

        assert!(result.is_err());
    }
}
