//! One-time verification codes sent by email

use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// What a verification code unlocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodePurpose {
    EmailVerification,
    PasswordReset,
    AccountUnlock,
    EmailChange,
}

impl CodePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodePurpose::EmailVerification => "email_verification",
            CodePurpose::PasswordReset => "password_reset",
            CodePurpose::AccountUnlock => "account_unlock",
            CodePurpose::EmailChange => "email_change",
        }
    }

    /// How long a freshly issued code stays valid
    pub fn lifetime(&self) -> Duration {
        match self {
            CodePurpose::EmailVerification => Duration::minutes(15),
            CodePurpose::PasswordReset => Duration::hours(1),
            CodePurpose::AccountUnlock | CodePurpose::EmailChange => Duration::minutes(10),
        }
    }
}

/// Stored verification code
#[derive(Debug, Clone, FromRow)]
pub struct VerificationCode {
    pub id: Uuid,
    pub email: String,
    pub code_hash: String,
    pub purpose: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Attempt counter of a code right after one attempt was taken from it
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct AttemptCount {
    pub attempts: i32,
    pub max_attempts: i32,
}

impl AttemptCount {
    /// Guesses still allowed once this one is spent
    pub fn remaining(&self) -> i32 {
        (self.max_attempts - self.attempts).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purpose_lifetimes() {
        assert_eq!(CodePurpose::EmailVerification.lifetime(), Duration::minutes(15));
        assert_eq!(CodePurpose::PasswordReset.lifetime(), Duration::hours(1));
        assert_eq!(CodePurpose::AccountUnlock.lifetime(), Duration::minutes(10));
        assert_eq!(CodePurpose::EmailChange.lifetime(), Duration::minutes(10));
        assert_eq!(CodePurpose::PasswordReset.as_str(), "password_reset");
        assert_eq!(CodePurpose::AccountUnlock.as_str(), "account_unlock");
    }

    #[test]
    fn test_remaining_attempts_count_the_spent_guess() {
        let first = AttemptCount {
            attempts: 1,
            max_attempts: 5,
        };
        assert_eq!(first.remaining(), 4);

        let last = AttemptCount {
            attempts: 5,
            max_attempts: 5,
        };
        assert_eq!(last.remaining(), 0);
    }
}
