//! Generation and hashing of short one-time codes

use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const VERIFICATION_CODE_LEN: usize = 6;
pub const BACKUP_CODE_COUNT: usize = 10;

/// Random 6-character upper-case alphanumeric code
pub fn generate_verification_code() -> String {
    let mut rng = rand::thread_rng();
    (0..VERIFICATION_CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// SHA-256 hex of the upper-cased code, the only form that is stored
pub fn hash_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.trim().to_uppercase().as_bytes()))
}

pub fn code_matches(input: &str, stored_hash: &str) -> bool {
    hash_code(input) == stored_hash
}

/// Ten 8-hex-digit backup codes
pub fn generate_backup_codes() -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..BACKUP_CODE_COUNT)
        .map(|_| {
            let mut bytes = [0u8; 4];
            rng.fill_bytes(&mut bytes);
            hex::encode_upper(bytes)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_code_shape() {
        let code = generate_verification_code();
        assert_eq!(code.len(), 6);
        assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_code_hash_is_case_insensitive() {
        let stored = hash_code("AB12CD");
        assert!(code_matches("ab12cd", &stored));
        assert!(code_matches(" AB12CD ", &stored));
        assert!(!code_matches("AB12CE", &stored));
    }

    #[test]
    fn test_backup_codes() {
        let codes = generate_backup_codes();
        assert_eq!(codes.len(), BACKUP_CODE_COUNT);
        for code in &codes {
            assert_eq!(code.len(), 8);
            assert!(code.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        }
    }
}
