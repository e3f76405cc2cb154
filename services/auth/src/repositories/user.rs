//! User repository for database operations

use anyhow::Result;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::models::{NewUser, User};

const USER_COLUMNS: &str = "id, email, name, password_hash, role, is_verified, disabled, \
     disabled_at, profile_image, two_factor_enabled, two_factor_secret, \
     pending_two_factor_secret, backup_codes_generated_at, pending_email, created_at, updated_at";

/// How many previous password hashes are kept for reuse checks
pub const PASSWORD_HISTORY_LIMIT: i64 = 3;

/// Outcome of confirming a pending email change
#[derive(Debug)]
pub enum EmailChange {
    Applied(User),
    /// Another account took the address after the change was requested
    Taken,
    NothingPending,
}

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new, unverified user
    pub async fn create(&self, new_user: &NewUser) -> Result<User> {
        info!("Creating new user: {}", new_user.email);

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, name, password_hash)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new_user.email)
        .bind(&new_user.name)
        .bind(&new_user.password_hash)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    /// Find a user by normalized email
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Find a user by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn mark_verified(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE users SET is_verified = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_name(&self, id: Uuid, name: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET name = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Hashes of the current password followed by the most recent previous ones
    pub async fn recent_password_hashes(&self, id: Uuid) -> Result<Vec<String>> {
        let hashes = sqlx::query_scalar::<_, String>(
            r#"
            (SELECT password_hash FROM users WHERE id = $1)
            UNION ALL
            (SELECT password_hash FROM password_history
             WHERE user_id = $1
             ORDER BY changed_at DESC
             LIMIT $2)
            "#,
        )
        .bind(id)
        .bind(PASSWORD_HISTORY_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        Ok(hashes)
    }

    /// Replace the password, moving the old hash into the bounded history
    pub async fn update_password(&self, id: Uuid, new_hash: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO password_history (user_id, password_hash)
            SELECT id, password_hash FROM users WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(new_hash)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            DELETE FROM password_history
            WHERE user_id = $1 AND id NOT IN (
                SELECT id FROM password_history
                WHERE user_id = $1
                ORDER BY changed_at DESC
                LIMIT $2
            )
            "#,
        )
        .bind(id)
        .bind(PASSWORD_HISTORY_LIMIT)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!("Password updated for user: {}", id);
        Ok(())
    }

    pub async fn set_pending_two_factor(&self, id: Uuid, secret: &str) -> Result<()> {
        sqlx::query(
            "UPDATE users SET pending_two_factor_secret = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(secret)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Promote the pending secret and store freshly hashed backup codes
    pub async fn enable_two_factor(&self, id: Uuid, code_hashes: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE users
            SET two_factor_enabled = TRUE,
                two_factor_secret = pending_two_factor_secret,
                pending_two_factor_secret = NULL,
                backup_codes_generated_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        super::backup_code::replace_in(&mut tx, id, code_hashes).await?;

        tx.commit().await?;
        info!("Two-factor authentication enabled for user: {}", id);
        Ok(())
    }

    pub async fn disable_two_factor(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE users
            SET two_factor_enabled = FALSE,
                two_factor_secret = NULL,
                pending_two_factor_secret = NULL,
                backup_codes_generated_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM backup_codes WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!("Two-factor authentication disabled for user: {}", id);
        Ok(())
    }

    pub async fn disable(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE users SET disabled = TRUE, disabled_at = NOW(), updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        info!("Account disabled: {}", id);
        Ok(())
    }

    /// Re-enable a disabled account
    pub async fn enable(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET disabled = FALSE, disabled_at = NULL, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        info!("Account re-enabled: {}", id);
        Ok(user)
    }

    pub async fn set_pending_email(&self, id: Uuid, email: &str) -> Result<()> {
        sqlx::query("UPDATE users SET pending_email = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(email)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Swap the pending address in as the account email
    pub async fn apply_pending_email(&self, id: Uuid) -> Result<EmailChange> {
        let updated = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET email = pending_email, pending_email = NULL, is_verified = TRUE, updated_at = NOW()
            WHERE id = $1 AND pending_email IS NOT NULL
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await;

        match updated {
            Ok(Some(user)) => {
                info!("Email changed for user: {}", id);
                Ok(EmailChange::Applied(user))
            }
            Ok(None) => Ok(EmailChange::NothingPending),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(EmailChange::Taken),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the user; sessions, codes and history cascade
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        info!("Account deleted: {}", id);
        Ok(result.rows_affected() > 0)
    }
}
