//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the broker.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the broker.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BrokerConfig {
    /// Listener configuration (bind host, port).
    pub listener: ListenerConfig,

    /// Admin authentication settings.
    pub auth: AuthConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Request admission settings.
    pub security: SecurityConfig,

    /// CORS settings.
    pub cors: CorsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Host to bind (e.g., "0.0.0.0").
    pub host: String,

    /// TCP port for the HTTP listener.
    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Admin authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Gate `/api/*` behind a bearer token.
    pub require_auth: bool,

    /// Secret compared to the login body.
    pub admin_password: String,

    /// Key used to mint and verify bearer tokens.
    pub token_secret: String,

    /// Token validity window in seconds.
    pub token_lifetime_secs: u64,
}

/// Placeholder credentials. Startup refuses `require_auth` while these are in effect.
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";
pub const DEFAULT_TOKEN_SECRET: &str = "burrow-insecure-dev-secret";

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            require_auth: false,
            admin_password: DEFAULT_ADMIN_PASSWORD.to_string(),
            token_secret: DEFAULT_TOKEN_SECRET.to_string(),
            token_lifetime_secs: 24 * 60 * 60,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Master switch for the gate.
    pub enabled: bool,

    /// Maximum HTTP requests per trailing minute, per source IP.
    pub max_requests_per_minute: usize,

    /// Maximum control-channel opens per trailing minute, per source IP.
    pub max_connections_per_ip: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests_per_minute: 100,
            max_connections_per_ip: 10,
        }
    }
}

/// Request admission configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Body size ceiling in bytes.
    pub max_request_size: usize,

    /// Closed set of admissible slugs; empty = open.
    pub slug_whitelist: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_request_size: 10 * 1024 * 1024,
            slug_whitelist: Vec::new(),
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Emit CORS headers on every reply.
    pub enabled: bool,

    /// Origin list; `["*"]` allows any origin.
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    /// The `Access-Control-Allow-Origin` value: `*` or the joined list.
    pub fn origin_header_value(&self) -> String {
        if self.allowed_origins.iter().any(|o| o == "*") {
            "*".to_string()
        } else {
            self.allowed_origins.join(", ")
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = BrokerConfig::default();
        assert_eq!(config.listener.port, 3000);
        assert!(!config.auth.require_auth);
        assert_eq!(config.auth.token_lifetime_secs, 86_400);
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.max_requests_per_minute, 100);
        assert_eq!(config.rate_limit.max_connections_per_ip, 10);
        assert_eq!(config.security.max_request_size, 10 * 1024 * 1024);
        assert!(config.security.slug_whitelist.is_empty());
        assert!(config.cors.enabled);
        assert_eq!(config.cors.origin_header_value(), "*");
    }

    #[test]
    fn test_origin_header_joins_explicit_list() {
        let cors = CorsConfig {
            enabled: true,
            allowed_origins: vec!["https://a.example".into(), "https://b.example".into()],
        };
        assert_eq!(
            cors.origin_header_value(),
            "https://a.example, https://b.example"
        );
    }

    #[test]
    fn test_minimal_toml_round_trip() {
        let config: BrokerConfig = toml::from_str(
            r#"
            [listener]
            port = 8088

            [auth]
            require_auth = true
            admin_password = "s3cret"
            "#,
        )
        .unwrap();
        assert_eq!(config.listener.port, 8088);
        assert!(config.auth.require_auth);
        assert_eq!(config.auth.admin_password, "s3cret");
        // Untouched sections keep their defaults.
        assert_eq!(config.rate_limit.max_requests_per_minute, 100);
    }
}
