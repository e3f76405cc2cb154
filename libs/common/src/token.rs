//! JWT claims shared by every service, plus access-token verification
//!
//! Tokens are signed with RS256 by the auth service. Other services only
//! hold the public key and use [`TokenVerifier`] to authenticate requests.
//! Revoked access tokens are tracked in Redis until they would have expired.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{cache::RedisPool, error::TokenError};

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    /// Normalized email of the user
    pub email: String,
    /// User role (`user` or `admin`)
    pub role: String,
    /// Session the token belongs to
    pub sid: Uuid,
    /// Unique token ID
    pub jti: Uuid,
    /// Issued at time
    pub iat: u64,
    /// Expiration time
    pub exp: u64,
    /// Token type (access or refresh)
    pub token_type: TokenType,
}

impl Claims {
    /// Whether the bearer has the administrator role
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }

    /// Seconds left before the token expires, relative to `now`
    pub fn remaining_lifetime(&self, now: u64) -> u64 {
        self.exp.saturating_sub(now)
    }
}

/// Token type enum
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    /// Access token
    Access,
    /// Refresh token
    Refresh,
}

/// Read a PEM key from an environment variable.
///
/// The variable holds either the PEM text itself or a path to a PEM file.
pub fn load_pem(var: &str) -> Result<String, TokenError> {
    let value =
        std::env::var(var).map_err(|_| TokenError::Key(format!("{} environment variable not set", var)))?;

    if value.starts_with("-----BEGIN") {
        return Ok(value);
    }

    std::fs::read_to_string(&value)
        .map(|pem| pem.trim().to_string())
        .map_err(|e| TokenError::Key(format!("Failed to read key file {}: {}", value, e)))
}

/// Validates RS256 tokens with the auth service's public key
#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Build a verifier from a PEM encoded RSA public key
    pub fn from_public_pem(public_key: &str) -> Result<Self, TokenError> {
        let decoding_key = DecodingKey::from_rsa_pem(public_key.as_bytes())
            .map_err(|e| TokenError::Key(format!("Invalid public key: {}", e)))?;
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        Ok(Self {
            decoding_key,
            validation,
        })
    }

    /// Build a verifier from `JWT_PUBLIC_KEY`
    pub fn from_env() -> Result<Self, TokenError> {
        Self::from_public_pem(&load_pem("JWT_PUBLIC_KEY")?)
    }

    /// Validate signature and expiry, returning the claims
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }

    /// Validate a token that must be an access token
    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.verify(token)?;
        if claims.token_type != TokenType::Access {
            return Err(TokenError::WrongType);
        }
        Ok(claims)
    }
}

fn blacklist_key(token: &str) -> String {
    format!("blacklisted_token:{}", token)
}

/// Check if a token is blacklisted in Redis
pub async fn is_blacklisted(redis_pool: &RedisPool, token: &str) -> anyhow::Result<bool> {
    Ok(redis_pool.get(&blacklist_key(token)).await?.is_some())
}

/// Blacklist a token in Redis for `ttl_seconds`
pub async fn blacklist(redis_pool: &RedisPool, token: &str, ttl_seconds: u64) -> anyhow::Result<()> {
    redis_pool
        .set(&blacklist_key(token), "1", Some(ttl_seconds))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use std::time::{SystemTime, UNIX_EPOCH};

    const PRIVATE_KEY: &str = include_str!("../testdata/jwt_private.pem");
    const PUBLIC_KEY: &str = include_str!("../testdata/jwt_public.pem");

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    fn sign(token_type: TokenType, exp: u64) -> String {
        let claims = Claims {
            sub: Uuid::new_v4(),
            email: "traveller@example.com".to_string(),
            role: "user".to_string(),
            sid: Uuid::new_v4(),
            jti: Uuid::new_v4(),
            iat: now(),
            exp,
            token_type,
        };
        let key = EncodingKey::from_rsa_pem(PRIVATE_KEY.as_bytes()).unwrap();
        encode(&Header::new(Algorithm::RS256), &claims, &key).unwrap()
    }

    #[test]
    fn test_verify_access_token() {
        let verifier = TokenVerifier::from_public_pem(PUBLIC_KEY).unwrap();
        let token = sign(TokenType::Access, now() + 900);

        let claims = verifier.verify_access(&token).unwrap();
        assert_eq!(claims.email, "traveller@example.com");
        assert!(!claims.is_admin());
    }

    #[test]
    fn test_refresh_token_rejected_as_access() {
        let verifier = TokenVerifier::from_public_pem(PUBLIC_KEY).unwrap();
        let token = sign(TokenType::Refresh, now() + 900);

        assert!(matches!(
            verifier.verify_access(&token),
            Err(TokenError::WrongType)
        ));
        assert!(verifier.verify(&token).is_ok());
    }

    #[test]
    fn test_expired_token_rejected() {
        let verifier = TokenVerifier::from_public_pem(PUBLIC_KEY).unwrap();
        let token = sign(TokenType::Access, now() - 10);

        assert!(matches!(
            verifier.verify(&token),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let verifier = TokenVerifier::from_public_pem(PUBLIC_KEY).unwrap();
        let mut token = sign(TokenType::Access, now() + 900);
        token.push('x');

        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn test_remaining_lifetime_saturates() {
        let claims = Claims {
            sub: Uuid::new_v4(),
            email: String::new(),
            role: "admin".to_string(),
            sid: Uuid::new_v4(),
            jti: Uuid::new_v4(),
            iat: 100,
            exp: 200,
            token_type: TokenType::Access,
        };
        assert_eq!(claims.remaining_lifetime(150), 50);
        assert_eq!(claims.remaining_lifetime(250), 0);
        assert!(claims.is_admin());
    }
}
