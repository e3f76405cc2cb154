//! Two-factor backup code storage

use anyhow::Result;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::BackupCode;

#[derive(Clone)]
pub struct BackupCodeRepository {
    pool: PgPool,
}

/// Swap a user's backup codes for a new set inside an open transaction
pub(super) async fn replace_in(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    code_hashes: &[String],
) -> Result<()> {
    sqlx::query("DELETE FROM backup_codes WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut **tx)
        .await?;

    for hash in code_hashes {
        sqlx::query("INSERT INTO backup_codes (user_id, code_hash) VALUES ($1, $2)")
            .bind(user_id)
            .bind(hash)
            .execute(&mut **tx)
            .await?;
    }

    Ok(())
}

impl BackupCodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<BackupCode>> {
        let codes = sqlx::query_as::<_, BackupCode>(
            r#"
            SELECT id, user_id, code_hash, used, used_at, created_at
            FROM backup_codes
            WHERE user_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(codes)
    }

    /// Replace every code and restart the regeneration clock
    pub async fn regenerate(&self, user_id: Uuid, code_hashes: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        replace_in(&mut tx, user_id, code_hashes).await?;
        sqlx::query(
            "UPDATE users SET backup_codes_generated_at = NOW(), updated_at = NOW() WHERE id = $1",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Consume a code. False when it was already used concurrently.
    pub async fn mark_used(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE backup_codes SET used = TRUE, used_at = NOW() WHERE id = $1 AND NOT used",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
