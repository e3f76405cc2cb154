//! JWT service for token generation
//!
//! Tokens are signed with RS256. Every token carries the session id (`sid`)
//! it was minted for, so refresh rotation and logout can find the session
//! row. Verification is shared with the other services through
//! [`common::token::TokenVerifier`].

use anyhow::Result;
use common::token::{self, Claims, TokenType, TokenVerifier};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::models::User;

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Private key for signing tokens
    pub private_key: String,
    /// Public key for verifying tokens
    pub public_key: String,
    /// Access token expiration time in seconds (default: 15 minutes)
    pub access_token_expiry: u64,
    /// Refresh token expiration time in seconds (default: 30 days)
    pub refresh_token_expiry: u64,
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    ///
    /// # Environment Variables
    /// - `JWT_PRIVATE_KEY`: Private key (PEM) or path to the key file
    /// - `JWT_PUBLIC_KEY`: Public key (PEM) or path to the key file
    /// - `JWT_ACCESS_TOKEN_EXPIRY`: Access token expiry in seconds (default: 900)
    /// - `JWT_REFRESH_TOKEN_EXPIRY`: Refresh token expiry in seconds (default: 2592000)
    pub fn from_env() -> Result<Self> {
        let private_key = token::load_pem("JWT_PRIVATE_KEY")?;
        let public_key = token::load_pem("JWT_PUBLIC_KEY")?;

        let access_token_expiry = std::env::var("JWT_ACCESS_TOKEN_EXPIRY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(900);

        let refresh_token_expiry = std::env::var("JWT_REFRESH_TOKEN_EXPIRY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(2_592_000);

        Ok(JwtConfig {
            private_key,
            public_key,
            access_token_expiry,
            refresh_token_expiry,
        })
    }
}

/// Access and refresh token pair returned to clients
#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

/// JWT service
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    verifier: TokenVerifier,
    config: JwtConfig,
}

impl JwtService {
    /// Initialize a new JWT service
    pub fn new(config: JwtConfig) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(config.private_key.as_bytes())?;
        let verifier = TokenVerifier::from_public_pem(&config.public_key)?;

        Ok(JwtService {
            encoding_key,
            verifier,
            config,
        })
    }

    fn sign(&self, user: &User, session_id: Uuid, token_type: TokenType) -> Result<String> {
        let now = now_secs()?;
        let lifetime = match token_type {
            TokenType::Access => self.config.access_token_expiry,
            TokenType::Refresh => self.config.refresh_token_expiry,
        };

        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role.clone(),
            sid: session_id,
            jti: Uuid::new_v4(),
            iat: now,
            exp: now + lifetime,
            token_type,
        };

        Ok(encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &self.encoding_key,
        )?)
    }

    /// Generate an access token for a user's session
    pub fn generate_access_token(&self, user: &User, session_id: Uuid) -> Result<String> {
        self.sign(user, session_id, TokenType::Access)
    }

    /// Generate a refresh token for a user's session
    pub fn generate_refresh_token(&self, user: &User, session_id: Uuid) -> Result<String> {
        self.sign(user, session_id, TokenType::Refresh)
    }

    /// Mint both tokens for a session
    pub fn issue_pair(&self, user: &User, session_id: Uuid) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.generate_access_token(user, session_id)?,
            refresh_token: self.generate_refresh_token(user, session_id)?,
            token_type: "Bearer",
            expires_in: self.config.access_token_expiry,
        })
    }

    /// Validate a refresh token and return its claims
    pub fn validate_refresh_token(&self, token: &str) -> Result<Claims> {
        let claims = self.verifier.verify(token)?;
        if claims.token_type != TokenType::Refresh {
            anyhow::bail!("Token is not a refresh token");
        }
        Ok(claims)
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Get the refresh token expiry time
    pub fn refresh_token_expiry(&self) -> u64 {
        self.config.refresh_token_expiry
    }
}

/// SHA-256 hex of a refresh token, the only form kept in the sessions table
pub fn token_fingerprint(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Seconds since the Unix epoch
pub fn now_secs() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| anyhow::anyhow!("Failed to get current time: {}", e))?
        .as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const PRIVATE_KEY: &str = include_str!("../../../libs/common/testdata/jwt_private.pem");
    const PUBLIC_KEY: &str = include_str!("../../../libs/common/testdata/jwt_public.pem");

    fn service() -> JwtService {
        JwtService::new(JwtConfig {
            private_key: PRIVATE_KEY.to_string(),
            public_key: PUBLIC_KEY.to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: 2_592_000,
        })
        .unwrap()
    }

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "guest@example.com".to_string(),
            name: "Guest".to_string(),
            password_hash: String::new(),
            role: "admin".to_string(),
            is_verified: true,
            disabled: false,
            disabled_at: None,
            profile_image: None,
            two_factor_enabled: false,
            two_factor_secret: None,
            pending_two_factor_secret: None,
            backup_codes_generated_at: None,
            pending_email: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_pair_carries_session_and_role() {
        let jwt = service();
        let user = user();
        let sid = Uuid::new_v4();
        let pair = jwt.issue_pair(&user, sid).unwrap();

        let access = jwt.verifier().verify_access(&pair.access_token).unwrap();
        assert_eq!(access.sub, user.id);
        assert_eq!(access.sid, sid);
        assert!(access.is_admin());
        assert_eq!(access.exp - access.iat, 900);

        let refresh = jwt.validate_refresh_token(&pair.refresh_token).unwrap();
        assert_eq!(refresh.sid, sid);
        assert_eq!(refresh.exp - refresh.iat, 2_592_000);
        assert_ne!(access.jti, refresh.jti);
    }

    #[test]
    fn test_access_token_is_not_a_refresh_token() {
        let jwt = service();
        let token = jwt.generate_access_token(&user(), Uuid::new_v4()).unwrap();
        assert!(jwt.validate_refresh_token(&token).is_err());
    }

    #[test]
    fn test_tokens_for_same_session_differ() {
        let jwt = service();
        let user = user();
        let sid = Uuid::new_v4();
        let a = jwt.generate_refresh_token(&user, sid).unwrap();
        let b = jwt.generate_refresh_token(&user, sid).unwrap();
        assert_ne!(token_fingerprint(&a), token_fingerprint(&b));
    }
}
