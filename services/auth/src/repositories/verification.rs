//! Verification code storage

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{AttemptCount, CodePurpose, VerificationCode};

#[derive(Clone)]
pub struct VerificationRepository {
    pool: PgPool,
}

impl VerificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Store a new code, dropping any outstanding code for the same purpose
    pub async fn issue(
        &self,
        email: &str,
        purpose: CodePurpose,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM verification_codes WHERE email = $1 AND purpose = $2")
            .bind(email)
            .bind(purpose.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO verification_codes (email, code_hash, purpose, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(email)
        .bind(code_hash)
        .bind(purpose.as_str())
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Newest unexpired code for the email and purpose
    pub async fn latest(&self, email: &str, purpose: CodePurpose) -> Result<Option<VerificationCode>> {
        let code = sqlx::query_as::<_, VerificationCode>(
            r#"
            SELECT id, email, code_hash, purpose, attempts, max_attempts, expires_at, created_at
            FROM verification_codes
            WHERE email = $1 AND purpose = $2 AND expires_at > NOW()
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(email)
        .bind(purpose.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(code)
    }

    /// Take one attempt from the code, or `None` once its attempts are used up.
    ///
    /// The check and the increment are one statement, so concurrent guesses
    /// can never spend more than `max_attempts` between them.
    pub async fn consume_attempt(&self, id: Uuid) -> Result<Option<AttemptCount>> {
        let count = sqlx::query_as::<_, AttemptCount>(
            r#"
            UPDATE verification_codes
            SET attempts = attempts + 1
            WHERE id = $1 AND attempts < max_attempts
            RETURNING attempts, max_attempts
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(count)
    }

    pub async fn clear(&self, email: &str, purpose: CodePurpose) -> Result<()> {
        sqlx::query("DELETE FROM verification_codes WHERE email = $1 AND purpose = $2")
            .bind(email)
            .bind(purpose.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
