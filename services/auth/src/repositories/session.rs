//! Session repository for database operations

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{NewSession, Session};

const SESSION_COLUMNS: &str =
    "id, user_id, token_hash, ip_address, user_agent, expires_at, revoked, created_at, last_used_at";

/// Outcome of presenting a refresh token for rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Rotated,
    /// The session is gone, revoked or expired
    Inactive,
    /// The token was already rotated away; the session has been revoked
    Reused,
}

/// Session repository
#[derive(Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    /// Create a new session repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, session: &NewSession) -> Result<Session> {
        let created = sqlx::query_as::<_, Session>(&format!(
            r#"
            INSERT INTO sessions (id, user_id, token_hash, ip_address, user_agent, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.token_hash)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(session.expires_at)
        .fetch_one(&self.pool)
        .await?;

        info!("Session {} created for user {}", created.id, created.user_id);
        Ok(created)
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Whether the session exists, is not revoked and has not expired
    pub async fn is_active(&self, id: Uuid) -> Result<bool> {
        let active = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM sessions WHERE id = $1 AND NOT revoked AND expires_at > NOW())",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(active)
    }

    /// Swap the stored refresh-token hash if `presented_hash` is still current.
    ///
    /// The compare-and-swap makes two concurrent refreshes with the same token
    /// produce exactly one winner.
    pub async fn rotate(
        &self,
        id: Uuid,
        presented_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Rotation> {
        let updated = sqlx::query(
            r#"
            UPDATE sessions
            SET token_hash = $3, expires_at = $4, last_used_at = NOW()
            WHERE id = $1 AND token_hash = $2 AND NOT revoked AND expires_at > NOW()
            "#,
        )
        .bind(id)
        .bind(presented_hash)
        .bind(new_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 1 {
            return Ok(Rotation::Rotated);
        }

        // A validly signed token whose hash no longer matches was stolen or replayed
        let revoked = sqlx::query(
            "UPDATE sessions SET revoked = TRUE WHERE id = $1 AND token_hash <> $2 AND NOT revoked",
        )
        .bind(id)
        .bind(presented_hash)
        .execute(&self.pool)
        .await?;

        if revoked.rows_affected() == 1 {
            warn!("Refresh token reuse detected, session {} revoked", id);
            Ok(Rotation::Reused)
        } else {
            Ok(Rotation::Inactive)
        }
    }

    pub async fn list_active(&self, user_id: Uuid) -> Result<Vec<Session>> {
        let sessions = sqlx::query_as::<_, Session>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM sessions
            WHERE user_id = $1 AND NOT revoked AND expires_at > NOW()
            ORDER BY last_used_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    /// Revoke one of the user's sessions
    pub async fn revoke(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked = TRUE WHERE id = $1 AND user_id = $2 AND NOT revoked",
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64> {
        let result =
            sqlx::query("UPDATE sessions SET revoked = TRUE WHERE user_id = $1 AND NOT revoked")
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        info!("Revoked {} sessions for user {}", result.rows_affected(), user_id);
        Ok(result.rows_affected())
    }

    /// Revoke every session of the user except `keep`
    pub async fn revoke_others(&self, user_id: Uuid, keep: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked = TRUE WHERE user_id = $1 AND id <> $2 AND NOT revoked",
        )
        .bind(user_id)
        .bind(keep)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
