//! Two-factor setup and backup code handlers

use axum::{Extension, Json, extract::State};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::confirm_password;
use crate::{
    AppState,
    codes,
    error::{AuthError, AuthResult},
    jwt,
    middleware::CurrentUser,
    password,
    totp,
};

const ISSUER: &str = "House of Paradise";
const REGENERATION_INTERVAL_DAYS: i64 = 30;

#[derive(Deserialize)]
pub struct CodeRequest {
    pub code: String,
}

#[derive(Deserialize)]
pub struct PasswordRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct BackupCodeStatus {
    pub total: usize,
    pub used: usize,
    pub available: usize,
    pub generated_at: Option<DateTime<Utc>>,
    pub next_regeneration_at: Option<DateTime<Utc>>,
    pub can_regenerate: bool,
}

/// Whole days left before backup codes may be regenerated, if any
fn regeneration_wait_days(generated_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<i64> {
    let next = generated_at? + Duration::days(REGENERATION_INTERVAL_DAYS);
    if next <= now {
        return None;
    }
    let seconds = (next - now).num_seconds();
    Some((seconds + 86_399) / 86_400)
}

fn hash_codes(plain: &[String]) -> AuthResult<Vec<String>> {
    Ok(plain
        .iter()
        .map(|code| password::hash_password(code))
        .collect::<anyhow::Result<Vec<_>>>()?)
}

fn require_enabled(current: &CurrentUser) -> AuthResult<()> {
    if current.user.two_factor_enabled {
        Ok(())
    } else {
        Err(AuthError::bad_request("Two-factor authentication is not enabled"))
    }
}

/// Start setup: store a pending secret and hand it to the authenticator app
pub async fn enable(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> AuthResult<Json<serde_json::Value>> {
    if current.user.two_factor_enabled {
        return Err(AuthError::bad_request(
            "Two-factor authentication is already enabled",
        ));
    }

    let secret = totp::generate_secret();
    state
        .user_repository
        .set_pending_two_factor(current.user.id, &secret)
        .await?;

    Ok(Json(json!({
        "secret": secret,
        "otpauth_url": totp::otpauth_uri(ISSUER, &current.user.email, &secret),
    })))
}

/// Confirm setup with a first code; returns the plain backup codes once
pub async fn verify_setup(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<CodeRequest>,
) -> AuthResult<Json<serde_json::Value>> {
    let pending = current
        .user
        .pending_two_factor_secret
        .as_deref()
        .ok_or_else(|| AuthError::bad_request("Two-factor setup has not been started"))?;

    if !totp::verify(pending, &payload.code, jwt::now_secs()?) {
        return Err(AuthError::bad_request("Invalid verification code"));
    }

    let backup_codes = codes::generate_backup_codes();
    state
        .user_repository
        .enable_two_factor(current.user.id, &hash_codes(&backup_codes)?)
        .await?;

    Ok(Json(json!({
        "message": "Two-factor authentication enabled",
        "backup_codes": backup_codes,
    })))
}

pub async fn backup_code_status(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> AuthResult<Json<BackupCodeStatus>> {
    require_enabled(&current)?;

    let stored = state.backup_code_repository.list(current.user.id).await?;
    let used = stored.iter().filter(|c| c.used).count();
    let generated_at = current.user.backup_codes_generated_at;

    Ok(Json(BackupCodeStatus {
        total: stored.len(),
        used,
        available: stored.len() - used,
        generated_at,
        next_regeneration_at: generated_at.map(|at| at + Duration::days(REGENERATION_INTERVAL_DAYS)),
        can_regenerate: regeneration_wait_days(generated_at, Utc::now()).is_none(),
    }))
}

pub async fn regenerate_backup_codes(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<PasswordRequest>,
) -> AuthResult<Json<serde_json::Value>> {
    confirm_password(&current.user, &payload.password)?;
    require_enabled(&current)?;

    if let Some(days) = regeneration_wait_days(current.user.backup_codes_generated_at, Utc::now()) {
        return Err(AuthError::bad_request(format!(
            "Backup codes can only be regenerated once every {} days. Try again in {} days",
            REGENERATION_INTERVAL_DAYS, days
        )));
    }

    let backup_codes = codes::generate_backup_codes();
    state
        .backup_code_repository
        .regenerate(current.user.id, &hash_codes(&backup_codes)?)
        .await?;

    info!("Backup codes regenerated for user {}", current.user.id);
    Ok(Json(json!({
        "message": "Backup codes regenerated",
        "backup_codes": backup_codes,
    })))
}

pub async fn disable(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<PasswordRequest>,
) -> AuthResult<Json<serde_json::Value>> {
    confirm_password(&current.user, &payload.password)?;
    require_enabled(&current)?;

    state.user_repository.disable_two_factor(current.user.id).await?;

    Ok(Json(json!({ "message": "Two-factor authentication disabled" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_generated_can_regenerate() {
        assert_eq!(regeneration_wait_days(None, Utc::now()), None);
    }

    #[test]
    fn test_wait_rounds_up_to_whole_days() {
        let now = Utc::now();
        assert_eq!(regeneration_wait_days(Some(now), now), Some(30));
        assert_eq!(
            regeneration_wait_days(Some(now - Duration::days(29) - Duration::hours(1)), now),
            Some(1)
        );
        assert_eq!(regeneration_wait_days(Some(now - Duration::days(30)), now), None);
    }

    #[test]
    fn test_hashed_codes_verify() {
        let plain = vec!["A1B2C3D4".to_string()];
        let hashed = hash_codes(&plain).unwrap();
        assert!(password::verify_password("A1B2C3D4", &hashed[0]).unwrap());
    }
}
