//! Configuration validation logic.

use crate::config::schema::{BrokerConfig, DEFAULT_ADMIN_PASSWORD, DEFAULT_TOKEN_SECRET};
use crate::security::validate::valid_slug;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Rendered as a list item by ConfigError; no prefix of its own.
        write!(f, "{}", self.0)
    }
}

/// Validate a BrokerConfig for semantic correctness.
pub fn validate_config(config: &BrokerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // 1. Refuse to gate the API behind placeholder credentials.
    if config.auth.require_auth {
        if config.auth.admin_password == DEFAULT_ADMIN_PASSWORD {
            errors.push(ValidationError(
                "auth.require_auth is set but auth.admin_password is the built-in default"
                    .to_string(),
            ));
        }
        if config.auth.token_secret == DEFAULT_TOKEN_SECRET {
            errors.push(ValidationError(
                "auth.require_auth is set but auth.token_secret is the built-in default"
                    .to_string(),
            ));
        }
    }

    if config.auth.token_lifetime_secs == 0 {
        errors.push(ValidationError(
            "auth.token_lifetime_secs must be > 0".to_string(),
        ));
    }

    // 2. Whitelist entries must themselves be valid slugs.
    for slug in &config.security.slug_whitelist {
        if !valid_slug(slug) {
            errors.push(ValidationError(format!(
                "security.slug_whitelist entry '{}' is not a valid slug",
                slug
            )));
        }
    }

    // 3. Validate thresholds.
    if config.rate_limit.enabled {
        if config.rate_limit.max_requests_per_minute == 0 {
            errors.push(ValidationError(
                "rate_limit.max_requests_per_minute must be > 0".to_string(),
            ));
        }
        if config.rate_limit.max_connections_per_ip == 0 {
            errors.push(ValidationError(
                "rate_limit.max_connections_per_ip must be > 0".to_string(),
            ));
        }
    }

    if config.security.max_request_size == 0 {
        errors.push(ValidationError(
            "security.max_request_size must be > 0".to_string(),
        ));
    }

    if config.cors.enabled && config.cors.allowed_origins.is_empty() {
        errors.push(ValidationError(
            "cors.allowed_origins must not be empty when CORS is enabled".to_string(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
