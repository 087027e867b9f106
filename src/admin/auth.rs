//! Bearer-token minting and verification for the admin API.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::AuthConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug)]
pub enum TokenError {
    Jwt(jsonwebtoken::errors::Error),
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Jwt(err) => write!(f, "jwt error: {err}"),
        }
    }
}

impl std::error::Error for TokenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TokenError::Jwt(err) => Some(err),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        TokenError::Jwt(value)
    }
}

/// Mints and verifies HS256 bearer tokens for the admin surface.
pub struct TokenKeeper {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: Duration,
}

impl TokenKeeper {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.token_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.token_secret.as_bytes()),
            lifetime: Duration::from_secs(config.token_lifetime_secs),
        }
    }

    /// The advertised validity window, in seconds.
    pub fn lifetime_secs(&self) -> u64 {
        self.lifetime.as_secs()
    }

    pub fn mint(&self) -> Result<String, TokenError> {
        let now = now_epoch_seconds();
        let claims = AdminClaims {
            sub: "admin".to_string(),
            iat: now,
            exp: now + self.lifetime.as_secs() as i64,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify(&self, token: &str) -> Result<AdminClaims, TokenError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        let data = decode::<AdminClaims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

fn now_epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth_config(lifetime_secs: u64) -> AuthConfig {
        AuthConfig {
            require_auth: true,
            admin_password: "pw".into(),
            token_secret: "unit-test-secret".into(),
            token_lifetime_secs: lifetime_secs,
        }
    }

    #[test]
    fn test_mint_then_verify() {
        let keeper = TokenKeeper::new(&auth_config(3600));
        let token = keeper.mint().unwrap();
        let claims = keeper.verify(&token).unwrap();
        assert_eq!(claims.sub, "admin");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let keeper = TokenKeeper::new(&auth_config(3600));
        let token = keeper.mint().unwrap();

        let mut other = auth_config(3600);
        other.token_secret = "different-secret".into();
        assert!(TokenKeeper::new(&other).verify(&token).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        let keeper = TokenKeeper::new(&auth_config(3600));
        assert!(keeper.verify("not.a.token").is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let config = auth_config(3600);
        let keeper = TokenKeeper::new(&config);

        let now = now_epoch_seconds();
        let stale = AdminClaims {
            sub: "admin".into(),
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = encode(
            &Header::default(),
            &stale,
            &EncodingKey::from_secret(config.token_secret.as_bytes()),
        )
        .unwrap();

        assert!(keeper.verify(&token).is_err());
    }
}
