use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// JWT claims presented on the WebSocket upgrade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Client device label ("mobile", "web", ...), recorded as connection metadata
    #[serde(default)]
    pub device: Option<String>,
    /// Additional custom claims
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Claims {
    pub fn user_id(&self) -> &str {
        &self.sub
    }

    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        self.exp < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extra_claims_are_kept() {
        let claims: Claims = serde_json::from_value(serde_json::json!({
            "sub": "user-1",
            "exp": 0,
            "iat": 0,
            "device": "web",
            "org": "acme"
        }))
        .unwrap();

        assert_eq!(claims.user_id(), "user-1");
        assert_eq!(claims.device.as_deref(), Some("web"));
        assert_eq!(claims.extra["org"], "acme");
        assert!(claims.is_expired());
    }
}
