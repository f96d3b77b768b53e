use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::server::{api_key_auth, AppState};

use super::connections::{broadcast, connection, send_to_user, user_connections};
use super::health::{health, stats};
use super::metrics::prometheus_metrics;
use super::mode::{get_mode, set_mode};

pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        // Admin endpoints, guarded by X-API-Key when configured
        .nest(
            "/api/v1",
            Router::new()
                .route("/mode", get(get_mode).put(set_mode))
                .route("/connections/{connection_id}", get(connection))
                .route("/users/{user_id}/connections", get(user_connections))
                .route("/users/{user_id}/send", post(send_to_user))
                .route("/broadcast", post(broadcast))
                .route_layer(middleware::from_fn_with_state(state, api_key_auth)),
        )
}
