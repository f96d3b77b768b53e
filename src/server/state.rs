use std::sync::Arc;
use std::time::Instant;

use crate::auth::JwtValidator;
use crate::config::Settings;
use crate::manager::UnifiedWebSocketManager;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub jwt_validator: Arc<JwtValidator>,
    pub manager: Arc<UnifiedWebSocketManager>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let manager = Arc::new(UnifiedWebSocketManager::from_settings(&settings));
        Self::with_manager(settings, manager)
    }

    pub fn with_manager(settings: Settings, manager: Arc<UnifiedWebSocketManager>) -> Self {
        Self {
            jwt_validator: Arc::new(JwtValidator::new(&settings.jwt)),
            settings: Arc::new(settings),
            manager,
            start_time: Instant::now(),
        }
    }
}
