//! Profile and account management handlers

use axum::{Extension, Json, extract::State};
use common::token;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{check_new_password, confirm_password};
use crate::{
    AppState,
    error::{AuthError, AuthResult},
    jwt,
    middleware::CurrentUser,
    models::{User, UserView},
    password,
    validation::validate_display_name,
};

#[derive(Deserialize)]
pub struct DisplayNameRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct PasswordConfirmation {
    pub password: String,
}

/// Refuse a new password matching the current one or a recent one
pub(crate) async fn ensure_not_recent(state: &AppState, user: &User, candidate: &str) -> AuthResult<()> {
    for hash in state.user_repository.recent_password_hashes(user.id).await? {
        if password::verify_password(candidate, &hash)? {
            return Err(AuthError::bad_request(
                "New password must be different from your current and last 3 passwords",
            ));
        }
    }
    Ok(())
}

pub async fn get_profile(Extension(current): Extension<CurrentUser>) -> Json<serde_json::Value> {
    Json(json!({ "user": UserView::from(&current.user) }))
}

pub async fn update_display_name(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<DisplayNameRequest>,
) -> AuthResult<Json<serde_json::Value>> {
    validate_display_name(&payload.name).map_err(AuthError::BadRequest)?;

    let user = state
        .user_repository
        .update_name(current.user.id, payload.name.trim())
        .await?
        .ok_or_else(|| AuthError::NotFound("User not found".to_string()))?;

    Ok(Json(json!({
        "message": "Display name updated successfully",
        "user": UserView::from(&user),
    })))
}

/// Change the password and sign out every other device
pub async fn change_password(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<ChangePasswordRequest>,
) -> AuthResult<Json<serde_json::Value>> {
    confirm_password(&current.user, &payload.current_password)
        .map_err(|_| AuthError::unauthorized("Current password is incorrect"))?;
    check_new_password(&state, &payload.new_password).await?;
    ensure_not_recent(&state, &current.user, &payload.new_password).await?;

    state
        .user_repository
        .update_password(current.user.id, &password::hash_password(&payload.new_password)?)
        .await?;
    let revoked = state
        .session_repository
        .revoke_others(current.user.id, current.claims.sid)
        .await?;

    info!(
        "Password changed for user {}, {} other sessions revoked",
        current.user.id, revoked
    );
    Ok(Json(json!({
        "message": "Password changed successfully",
        "sessions_revoked": revoked,
    })))
}

async fn end_current_access(state: &AppState, current: &CurrentUser) -> AuthResult<()> {
    let remaining = current.claims.remaining_lifetime(jwt::now_secs()?);
    token::blacklist(&state.redis_pool, &current.access_token, remaining).await?;
    Ok(())
}

pub async fn disable_account(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<PasswordConfirmation>,
) -> AuthResult<Json<serde_json::Value>> {
    confirm_password(&current.user, &payload.password)?;

    state.user_repository.disable(current.user.id).await?;
    state.session_repository.revoke_all(current.user.id).await?;
    end_current_access(&state, &current).await?;

    Ok(Json(json!({ "message": "Account disabled successfully" })))
}

pub async fn delete_account(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<PasswordConfirmation>,
) -> AuthResult<Json<serde_json::Value>> {
    confirm_password(&current.user, &payload.password)?;

    state.user_repository.delete(current.user.id).await?;
    end_current_access(&state, &current).await?;

    Ok(Json(json!({ "message": "Account deleted successfully" })))
}
