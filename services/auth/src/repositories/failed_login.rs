//! Failed login counters used by the account lockout

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::lockout::{FailedLogin, FailureOutcome};

#[derive(Clone)]
pub struct FailedLoginRepository {
    pool: PgPool,
}

impl FailedLoginRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, email: &str) -> Result<Option<FailedLogin>> {
        let record = sqlx::query_as::<_, FailedLogin>(
            r#"
            SELECT email, attempts, locked_until, last_attempt, ip_addresses
            FROM failed_logins
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Persist the counter computed by the lockout policy
    pub async fn save(
        &self,
        email: &str,
        outcome: FailureOutcome,
        ip_address: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO failed_logins (email, attempts, locked_until, last_attempt, ip_addresses)
            VALUES ($1, $2, $3, $4, ARRAY[$5])
            ON CONFLICT (email) DO UPDATE
            SET attempts = EXCLUDED.attempts,
                locked_until = EXCLUDED.locked_until,
                last_attempt = EXCLUDED.last_attempt,
                ip_addresses = CASE
                    WHEN EXCLUDED.attempts = 1 THEN EXCLUDED.ip_addresses
                    WHEN $5 = ANY(failed_logins.ip_addresses) THEN failed_logins.ip_addresses
                    ELSE array_append(failed_logins.ip_addresses, $5)
                END
            "#,
        )
        .bind(email)
        .bind(outcome.attempts)
        .bind(outcome.locked_until)
        .bind(now)
        .bind(ip_address)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn clear(&self, email: &str) -> Result<()> {
        sqlx::query("DELETE FROM failed_logins WHERE email = $1")
            .bind(email)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
