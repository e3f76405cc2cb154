//! Unlocking disabled accounts and changing the account email

use axum::{Extension, Json, extract::State};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{
    AuthResponse, ClientContext, INVALID_CODE, check_code, confirm_password, send_code,
    send_code_quietly, start_session,
};
use crate::{
    AppState,
    error::{AuthError, AuthResult},
    middleware::CurrentUser,
    models::{CodePurpose, UserView},
    repositories::EmailChange,
    validation::{normalize_email, validate_email},
};

const UNLOCK_CODE_SENT: &str =
    "If this email exists and the account is disabled, you will receive an unlock code";
const EMAIL_UNAVAILABLE: &str = "Unable to use this email address";

#[derive(Deserialize)]
pub struct UnlockRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct VerifyUnlockRequest {
    pub email: String,
    pub code: String,
}

#[derive(Deserialize)]
pub struct EmailChangeRequest {
    pub new_email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct VerifyEmailChangeRequest {
    pub code: String,
}

/// Validate and normalize a requested address against the current one
fn email_change_target(current: &str, requested: &str) -> AuthResult<String> {
    validate_email(requested.trim()).map_err(AuthError::BadRequest)?;

    let target = normalize_email(requested);
    if target == current {
        return Err(AuthError::bad_request(
            "New email must be different from your current email",
        ));
    }
    Ok(target)
}

/// Email an unlock code to a disabled account
pub async fn request_unlock(
    State(state): State<AppState>,
    Json(payload): Json<UnlockRequest>,
) -> AuthResult<Json<serde_json::Value>> {
    let email = normalize_email(&payload.email);

    match state.user_repository.find_by_email(&email).await? {
        Some(user) if user.disabled => {
            send_code_quietly(&state, &user, CodePurpose::AccountUnlock).await;
        }
        _ => info!("Unlock requested for an unknown or active account"),
    }

    Ok(Json(json!({ "message": UNLOCK_CODE_SENT })))
}

/// Re-enable a disabled account with its unlock code and sign the user in
pub async fn verify_unlock(
    State(state): State<AppState>,
    client: ClientContext,
    Json(payload): Json<VerifyUnlockRequest>,
) -> AuthResult<Json<AuthResponse>> {
    let email = normalize_email(&payload.email);
    check_code(&state, &email, CodePurpose::AccountUnlock, &payload.code).await?;

    let user = state
        .user_repository
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AuthError::bad_request(INVALID_CODE))?;
    if !user.disabled {
        return Err(AuthError::bad_request("Account is not disabled"));
    }

    let user = state
        .user_repository
        .enable(user.id)
        .await?
        .ok_or_else(|| AuthError::bad_request(INVALID_CODE))?;
    state
        .verification_repository
        .clear(&email, CodePurpose::AccountUnlock)
        .await?;
    state.failed_login_repository.clear(&email).await?;

    let tokens = start_session(&state, &user, &client).await?;
    info!("Account {} unlocked", user.id);

    Ok(Json(AuthResponse {
        message: "Account unlocked successfully",
        user: UserView::from(&user),
        tokens,
    }))
}

/// Start an email change by sending a code to the new address
pub async fn request_email_change(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<EmailChangeRequest>,
) -> AuthResult<Json<serde_json::Value>> {
    confirm_password(&current.user, &payload.password)?;
    let new_email = email_change_target(&current.user.email, &payload.new_email)?;

    if state.user_repository.find_by_email(&new_email).await?.is_some() {
        return Err(AuthError::bad_request(EMAIL_UNAVAILABLE));
    }

    state
        .user_repository
        .set_pending_email(current.user.id, &new_email)
        .await?;
    send_code(&state, &new_email, &current.user.name, CodePurpose::EmailChange).await?;
    info!("Email change requested by user {}", current.user.id);

    Ok(Json(json!({
        "message": "Verification code sent to your new email address",
        "pending_email": new_email,
    })))
}

/// Confirm the pending email change with the code sent to the new address
pub async fn verify_email_change(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<VerifyEmailChangeRequest>,
) -> AuthResult<Json<serde_json::Value>> {
    let pending = current
        .user
        .pending_email
        .as_deref()
        .ok_or_else(|| AuthError::bad_request("No email change was requested"))?;
    check_code(&state, pending, CodePurpose::EmailChange, &payload.code).await?;

    match state.user_repository.apply_pending_email(current.user.id).await? {
        EmailChange::Applied(user) => {
            state
                .verification_repository
                .clear(pending, CodePurpose::EmailChange)
                .await?;
            Ok(Json(json!({
                "message": "Email changed successfully",
                "user": UserView::from(&user),
            })))
        }
        EmailChange::Taken => Err(AuthError::bad_request(EMAIL_UNAVAILABLE)),
        EmailChange::NothingPending => {
            Err(AuthError::bad_request("No email change was requested"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_change_target_normalizes() {
        let target = email_change_target("old@example.com", "  New.Guest@Example.COM ").unwrap();
        assert_eq!(target, "new.guest@example.com");
    }

    #[test]
    fn test_email_change_target_rejects_current_alias() {
        // Gmail ignores dots and tags, so this is the same mailbox
        let err = email_change_target("janedoe@gmail.com", "jane.doe+trips@gmail.com").unwrap_err();
        assert!(matches!(err, AuthError::BadRequest(_)));
    }

    #[test]
    fn test_email_change_target_rejects_malformed() {
        assert!(email_change_target("old@example.com", "not-an-email").is_err());
        assert!(email_change_target("old@example.com", "").is_err());
    }
}
