//! Password hashing and breach checks

use anyhow::Result;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use sha1::{Digest, Sha1};
use std::{sync::OnceLock, time::Duration};
use tracing::warn;

/// Hash a secret with argon2 and a random salt
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();
    Ok(hash)
}

/// Verify a secret against a stored argon2 hash
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| anyhow::anyhow!("Failed to parse password hash: {}", e))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Burn the same verification time when no account exists for a login,
/// so response timing does not reveal which emails are registered.
pub fn verify_against_dummy(password: &str) {
    static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();
    let dummy = DUMMY_HASH.get_or_init(|| hash_password("not-a-real-account-password").ok());
    if let Some(hash) = dummy {
        let _ = verify_password(password, hash);
    }
}

/// Upper-case SHA-1 hex of the password split into the 5-char range prefix and the suffix
fn range_query_parts(password: &str) -> (String, String) {
    let digest = hex::encode_upper(Sha1::digest(password.as_bytes()));
    let (prefix, suffix) = digest.split_at(5);
    (prefix.to_string(), suffix.to_string())
}

/// Whether a Pwned Passwords range response lists `suffix`
fn range_contains(body: &str, suffix: &str) -> bool {
    body.lines()
        .filter_map(|line| line.split(':').next())
        .any(|candidate| candidate.trim().eq_ignore_ascii_case(suffix))
}

/// k-anonymity lookup against the Pwned Passwords range API
#[derive(Clone)]
pub struct BreachChecker {
    client: reqwest::Client,
    base_url: String,
    enabled: bool,
}

impl BreachChecker {
    pub fn new(enabled: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(3))
            .user_agent("House-of-Paradise-Travel-Booking")
            .build()?;

        Ok(Self {
            client,
            base_url: "https://api.pwnedpasswords.com/range".to_string(),
            enabled,
        })
    }

    /// Returns true when the password appears in a known breach.
    ///
    /// Lookup failures never block the caller: they are logged and treated as "not found".
    pub async fn is_compromised(&self, password: &str) -> bool {
        if !self.enabled {
            return false;
        }

        let (prefix, suffix) = range_query_parts(password);
        let url = format!("{}/{}", self.base_url, prefix);

        let body = match self.client.get(&url).send().await {
            Ok(response) => match response.error_for_status() {
                Ok(response) => response.text().await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        match body {
            Ok(body) => range_contains(&body, &suffix),
            Err(e) => {
                warn!("Pwned Passwords lookup failed, allowing password: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("Paradise#2024").unwrap();
        assert!(verify_password("Paradise#2024", &hash).unwrap());
        assert!(!verify_password("paradise#2024", &hash).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("Paradise#2024").unwrap();
        let b = hash_password("Paradise#2024").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_hash_is_an_error() {
        assert!(verify_password("anything", "not-a-phc-string").is_err());
    }

    #[test]
    fn test_range_query_parts() {
        // SHA-1("password") = 5BAA61E4C9B93F3F0682250B6CF8331B7EE68FD8
        let (prefix, suffix) = range_query_parts("password");
        assert_eq!(prefix, "5BAA6");
        assert_eq!(suffix, "1E4C9B93F3F0682250B6CF8331B7EE68FD8");
    }

    #[test]
    fn test_range_contains() {
        let body = "0018A45C4D1DEF81644B54AB7F969B88D65:1\r\n1E4C9B93F3F0682250B6CF8331B7EE68FD8:9545824\r\n";
        assert!(range_contains(body, "1E4C9B93F3F0682250B6CF8331B7EE68FD8"));
        assert!(!range_contains(body, "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF"));
    }

    #[tokio::test]
    async fn test_disabled_checker_never_reports() {
        let checker = BreachChecker::new(false).unwrap();
        assert!(!checker.is_compromised("password").await);
    }
}
