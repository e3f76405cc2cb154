//! Per-account login lockout
//!
//! Failures are counted per normalized email inside a sliding window. Once
//! the limit is reached the account is locked for a fixed period, whatever
//! IP the attempts come from. Early failures are also slowed down with a
//! small progressive delay.

use chrono::{DateTime, Duration, Utc};

pub const MAX_FAILED_ATTEMPTS: i32 = 5;

/// Delay applied after the n-th consecutive failure, in seconds
const PROGRESSIVE_DELAYS: [u64; 5] = [0, 1, 2, 5, 10];

/// Lockout policy values
#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    pub max_attempts: i32,
    pub window: Duration,
    pub lock_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_FAILED_ATTEMPTS,
            window: Duration::minutes(15),
            lock_duration: Duration::minutes(15),
        }
    }
}

/// Stored failure counter for one email
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FailedLogin {
    pub email: String,
    pub attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_attempt: DateTime<Utc>,
    pub ip_addresses: Vec<String>,
}

/// Result of recording one more failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    pub attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LockoutPolicy {
    /// Minutes left on an active lock, rounded up
    pub fn remaining_lock_minutes(
        &self,
        record: Option<&FailedLogin>,
        now: DateTime<Utc>,
    ) -> Option<i64> {
        let locked_until = record?.locked_until?;
        if locked_until <= now {
            return None;
        }
        let seconds = (locked_until - now).num_seconds();
        Some((seconds + 59) / 60)
    }

    /// Counter value and lock state after one more failure at `now`
    pub fn next_failure(&self, record: Option<&FailedLogin>, now: DateTime<Utc>) -> FailureOutcome {
        let previous = match record {
            Some(r) if now - r.last_attempt <= self.window && !self.lock_expired(r, now) => {
                r.attempts
            }
            _ => 0,
        };
        let attempts = previous + 1;
        let locked_until = (attempts >= self.max_attempts).then(|| now + self.lock_duration);

        FailureOutcome {
            attempts,
            locked_until,
        }
    }

    fn lock_expired(&self, record: &FailedLogin, now: DateTime<Utc>) -> bool {
        matches!(record.locked_until, Some(until) if until <= now)
    }
}

/// Delay to impose after the given number of consecutive failures
pub fn progressive_delay(attempts: i32) -> std::time::Duration {
    let index = usize::try_from(attempts.max(1) - 1)
        .unwrap_or(0)
        .min(PROGRESSIVE_DELAYS.len() - 1);
    std::time::Duration::from_secs(PROGRESSIVE_DELAYS[index])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(attempts: i32, last_attempt: DateTime<Utc>, locked_until: Option<DateTime<Utc>>) -> FailedLogin {
        FailedLogin {
            email: "guest@example.com".to_string(),
            attempts,
            locked_until,
            last_attempt,
            ip_addresses: vec!["10.0.0.1".to_string()],
        }
    }

    #[test]
    fn test_first_failure_starts_counter() {
        let policy = LockoutPolicy::default();
        let outcome = policy.next_failure(None, Utc::now());
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.locked_until.is_none());
    }

    #[test]
    fn test_fifth_failure_locks_for_fifteen_minutes() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        let r = record(4, now - Duration::minutes(1), None);

        let outcome = policy.next_failure(Some(&r), now);
        assert_eq!(outcome.attempts, 5);
        assert_eq!(outcome.locked_until, Some(now + Duration::minutes(15)));
    }

    #[test]
    fn test_stale_failures_are_forgotten() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        let r = record(4, now - Duration::minutes(16), None);

        assert_eq!(policy.next_failure(Some(&r), now).attempts, 1);
    }

    #[test]
    fn test_expired_lock_resets_counter() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        let r = record(5, now - Duration::minutes(1), Some(now - Duration::seconds(1)));

        assert_eq!(policy.remaining_lock_minutes(Some(&r), now), None);
        assert_eq!(policy.next_failure(Some(&r), now).attempts, 1);
    }

    #[test]
    fn test_remaining_minutes_round_up() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        let r = record(5, now, Some(now + Duration::seconds(61)));

        assert_eq!(policy.remaining_lock_minutes(Some(&r), now), Some(2));
        assert_eq!(policy.remaining_lock_minutes(None, now), None);
    }

    #[test]
    fn test_progressive_delays() {
        assert_eq!(progressive_delay(1).as_secs(), 0);
        assert_eq!(progressive_delay(2).as_secs(), 1);
        assert_eq!(progressive_delay(4).as_secs(), 5);
        assert_eq!(progressive_delay(50).as_secs(), 10);
        assert_eq!(progressive_delay(0).as_secs(), 0);
    }
}
