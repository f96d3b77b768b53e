mod settings;

pub use settings::{
    ApiConfig, DeliverySettings, JwtConfig, LogFormat, LoggingConfig, ServerConfig, Settings,
    WebSocketConfig,
};
