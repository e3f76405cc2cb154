//! Time-based one-time passwords (RFC 6238) for two-factor login
//!
//! HMAC-SHA1, 6 digits, 30 second steps, which is what authenticator apps
//! expect from an `otpauth://totp` URI without extra parameters.

use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;

const STEP_SECONDS: u64 = 30;
const DIGITS: u32 = 6;
/// Accepted clock drift, in steps, on either side of now
const SKEW_STEPS: u64 = 1;
const SECRET_BYTES: usize = 20;

/// RFC 4648 base32 without padding
pub fn base32_encode(data: &[u8]) -> String {
    BASE32_NOPAD.encode(data)
}

/// Decode RFC 4648 base32, tolerating lower case, spaces and padding
pub fn base32_decode(input: &str) -> Option<Vec<u8>> {
    let normalized: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    BASE32_NOPAD.decode(normalized.as_bytes()).ok()
}

/// Fresh random secret, base32 encoded
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    base32_encode(&bytes)
}

/// HOTP value (RFC 4226) for a counter, truncated to `digits`
fn hotp(secret: &[u8], counter: u64, digits: u32) -> u32 {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret).expect("HMAC accepts keys of any size");
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = (u32::from(digest[offset]) & 0x7f) << 24
        | u32::from(digest[offset + 1]) << 16
        | u32::from(digest[offset + 2]) << 8
        | u32::from(digest[offset + 3]);

    binary % 10u32.pow(digits)
}

/// Code valid for the step containing `unix_time`
pub fn code_at(secret: &[u8], unix_time: u64) -> String {
    format!(
        "{:0width$}",
        hotp(secret, unix_time / STEP_SECONDS, DIGITS),
        width = DIGITS as usize
    )
}

/// Check a user supplied code against a base32 secret at `unix_time`
pub fn verify(secret_b32: &str, code: &str, unix_time: u64) -> bool {
    let code = code.trim();
    if code.len() != DIGITS as usize || !code.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let Some(secret) = base32_decode(secret_b32) else {
        return false;
    };

    let step = unix_time / STEP_SECONDS;
    (step.saturating_sub(SKEW_STEPS)..=step + SKEW_STEPS)
        .any(|s| code_at(&secret, s * STEP_SECONDS) == code)
}

/// Provisioning URI understood by authenticator apps
pub fn otpauth_uri(issuer: &str, account: &str, secret_b32: &str) -> String {
    let encode = |s: &str| s.replace('%', "%25").replace(' ', "%20").replace(':', "%3A");
    format!(
        "otpauth://totp/{}:{}?secret={}&issuer={}&algorithm=SHA1&digits={}&period={}",
        encode(issuer),
        encode(account),
        secret_b32,
        encode(issuer),
        DIGITS,
        STEP_SECONDS
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const RFC_SECRET: &[u8] = b"12345678901234567890";

    #[test]
    fn test_rfc6238_vectors() {
        // RFC 6238 appendix B, SHA-1, last six digits of the 8-digit values
        assert_eq!(code_at(RFC_SECRET, 59), "287082");
        assert_eq!(code_at(RFC_SECRET, 1_111_111_109), "081804");
        assert_eq!(code_at(RFC_SECRET, 1_234_567_890), "005924");
        assert_eq!(code_at(RFC_SECRET, 2_000_000_000), "279037");
    }

    #[test]
    fn test_base32_known_value() {
        assert_eq!(base32_encode(b"foobar"), "MZXW6YTBOI");
        assert_eq!(base32_decode("MZXW6YTBOI======").unwrap(), b"foobar");
        assert_eq!(base32_decode("mzxw 6ytb oi").unwrap(), b"foobar");
        assert!(base32_decode("MZ1W").is_none());
    }

    #[test]
    fn test_base32_matches_authenticator_secrets() {
        // The RFC 6238 seed as authenticator apps display it
        assert_eq!(base32_encode(RFC_SECRET), "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ");
        assert_eq!(
            base32_decode("gezd gnbv gy3t qojq gezd gnbv gy3t qojq").unwrap(),
            RFC_SECRET
        );
    }

    #[test]
    fn test_generated_secret_round_trips() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 32);
        assert_eq!(base32_decode(&secret).unwrap().len(), SECRET_BYTES);
    }

    #[test]
    fn test_verify_accepts_adjacent_steps_only() {
        let secret = base32_encode(RFC_SECRET);
        let now = 1_111_111_109;

        assert!(verify(&secret, "081804", now));
        assert!(verify(&secret, &code_at(RFC_SECRET, now - 30), now));
        assert!(verify(&secret, &code_at(RFC_SECRET, now + 30), now));
        assert!(!verify(&secret, &code_at(RFC_SECRET, now + 90), now));
    }

    #[test]
    fn test_verify_rejects_malformed_codes() {
        let secret = base32_encode(RFC_SECRET);
        assert!(!verify(&secret, "08180", 1_111_111_109));
        assert!(!verify(&secret, "08180a", 1_111_111_109));
        assert!(!verify("not base32!", "081804", 1_111_111_109));
    }

    #[test]
    fn test_otpauth_uri() {
        let uri = otpauth_uri("House of Paradise", "guest@example.com", "ABC");
        assert_eq!(
            uri,
            "otpauth://totp/House%20of%20Paradise:guest@example.com?secret=ABC&issuer=House%20of%20Paradise&algorithm=SHA1&digits=6&period=30"
        );
    }
}
