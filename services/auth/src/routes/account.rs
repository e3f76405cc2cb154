//! Registration, verification, login and token lifecycle handlers

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{Duration, Utc};
use common::token;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    AuthResponse, ClientContext, check_code, check_new_password, send_code_quietly, start_session,
};
use crate::{
    AppState,
    error::{AuthError, AuthResult},
    jwt::{self, token_fingerprint},
    lockout,
    middleware::CurrentUser,
    models::{CodePurpose, NewUser, User, UserView},
    password,
    repositories::session::Rotation,
    totp,
    validation::{normalize_email, validate_display_name, validate_email},
};

const INVALID_CREDENTIALS: &str = "Invalid email or password";
const GENERIC_CODE_SENT: &str =
    "If an account exists for this email, a code has been sent";

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub code: String,
}

#[derive(Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct TwoFactorLoginRequest {
    pub user_id: Uuid,
    pub code: String,
}

#[derive(Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

/// User registration endpoint
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AuthResult<impl IntoResponse> {
    validate_display_name(&payload.name).map_err(AuthError::BadRequest)?;
    validate_email(payload.email.trim()).map_err(AuthError::BadRequest)?;
    check_new_password(&state, &payload.password).await?;

    let email = normalize_email(&payload.email);
    if state.user_repository.find_by_email(&email).await?.is_some() {
        warn!("Registration attempted for an existing account");
        return Err(AuthError::bad_request(
            "Unable to register with the provided information",
        ));
    }

    let user = state
        .user_repository
        .create(&NewUser {
            email,
            name: payload.name.trim().to_string(),
            password_hash: password::hash_password(&payload.password)?,
        })
        .await?;

    // A failed delivery is recovered through resend-code
    send_code_quietly(&state, &user, CodePurpose::EmailVerification).await;
    info!("Registered user {}", user.id);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Registration successful. Please check your email for the verification code",
            "email": user.email,
            "requires_verification": true,
        })),
    ))
}

/// Email verification endpoint; signs the user in on success
pub async fn verify_email(
    State(state): State<AppState>,
    client: ClientContext,
    Json(payload): Json<VerifyEmailRequest>,
) -> AuthResult<Json<AuthResponse>> {
    let email = normalize_email(&payload.email);
    check_code(&state, &email, CodePurpose::EmailVerification, &payload.code).await?;

    let user = state
        .user_repository
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AuthError::bad_request("Invalid or expired verification code"))?;

    state.user_repository.mark_verified(user.id).await?;
    state
        .verification_repository
        .clear(&email, CodePurpose::EmailVerification)
        .await?;
    let user = User {
        is_verified: true,
        ..user
    };

    let tokens = start_session(&state, &user, &client).await?;
    info!("Email verified for user {}", user.id);

    Ok(Json(AuthResponse {
        message: "Email verified successfully",
        user: UserView::from(&user),
        tokens,
    }))
}

/// Re-send the email verification code
pub async fn resend_code(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> AuthResult<Json<serde_json::Value>> {
    let email = normalize_email(&payload.email);

    if let Some(user) = state.user_repository.find_by_email(&email).await? {
        if !user.is_verified && !user.disabled {
            send_code_quietly(&state, &user, CodePurpose::EmailVerification).await;
        }
    }

    Ok(Json(json!({ "message": GENERIC_CODE_SENT })))
}

/// Count a failed sign-in against the account and build the error to return
async fn register_failure(state: &AppState, email: &str, client: &ClientContext) -> AuthResult<AuthError> {
    let now = Utc::now();
    let record = state.failed_login_repository.find(email).await?;
    let outcome = state.lockout.next_failure(record.as_ref(), now);
    state
        .failed_login_repository
        .save(email, outcome, client.ip_or_unknown(), now)
        .await?;

    if outcome.locked_until.is_some() {
        warn!("Account {} locked after {} failed attempts", email, outcome.attempts);
        return Ok(AuthError::Locked {
            remaining_minutes: state.lockout.lock_duration.num_minutes(),
        });
    }

    tokio::time::sleep(lockout::progressive_delay(outcome.attempts)).await;
    Ok(AuthError::unauthorized(INVALID_CREDENTIALS))
}

async fn ensure_not_locked(state: &AppState, email: &str) -> AuthResult<()> {
    let record = state.failed_login_repository.find(email).await?;
    match state.lockout.remaining_lock_minutes(record.as_ref(), Utc::now()) {
        Some(remaining_minutes) => Err(AuthError::Locked { remaining_minutes }),
        None => Ok(()),
    }
}

/// User login endpoint
pub async fn login(
    State(state): State<AppState>,
    client: ClientContext,
    Json(payload): Json<LoginRequest>,
) -> AuthResult<impl IntoResponse> {
    let email = normalize_email(&payload.email);
    ensure_not_locked(&state, &email).await?;

    let Some(user) = state.user_repository.find_by_email(&email).await? else {
        password::verify_against_dummy(&payload.password);
        return Err(register_failure(&state, &email, &client).await?);
    };

    if !password::verify_password(&payload.password, &user.password_hash)? {
        return Err(register_failure(&state, &email, &client).await?);
    }

    if user.disabled {
        return Err(AuthError::forbidden("Account is disabled"));
    }
    if !user.is_verified {
        return Err(AuthError::forbidden(
            "Please verify your email before logging in",
        ));
    }

    state.failed_login_repository.clear(&email).await?;

    if user.two_factor_enabled {
        info!("Password accepted for {}, awaiting second factor", user.id);
        return Ok(Json(json!({
            "requires_two_factor": true,
            "user_id": user.id,
        }))
        .into_response());
    }

    let tokens = start_session(&state, &user, &client).await?;
    info!("User {} logged in", user.id);

    Ok(Json(AuthResponse {
        message: "Login successful",
        user: UserView::from(&user),
        tokens,
    })
    .into_response())
}

/// Match a backup code against the user's unused codes and consume it
async fn redeem_backup_code(state: &AppState, user: &User, code: &str) -> AuthResult<bool> {
    let candidate = code.trim().to_uppercase();
    for stored in state.backup_code_repository.list(user.id).await? {
        if !stored.used && password::verify_password(&candidate, &stored.code_hash)? {
            return Ok(state.backup_code_repository.mark_used(stored.id).await?);
        }
    }
    Ok(false)
}

/// Second login step for accounts with two-factor authentication
pub async fn verify_two_factor_login(
    State(state): State<AppState>,
    client: ClientContext,
    Json(payload): Json<TwoFactorLoginRequest>,
) -> AuthResult<Json<serde_json::Value>> {
    let user = state
        .user_repository
        .find_by_id(payload.user_id)
        .await?
        .filter(|u| u.two_factor_enabled && !u.disabled)
        .ok_or_else(|| AuthError::unauthorized("Invalid two-factor code"))?;
    ensure_not_locked(&state, &user.email).await?;

    let now = jwt::now_secs()?;
    let totp_ok = user
        .two_factor_secret
        .as_deref()
        .is_some_and(|secret| totp::verify(secret, &payload.code, now));

    let used_backup_code = !totp_ok && redeem_backup_code(&state, &user, &payload.code).await?;

    if !totp_ok && !used_backup_code {
        return Err(match register_failure(&state, &user.email, &client).await? {
            AuthError::Unauthorized(_) => AuthError::unauthorized("Invalid two-factor code"),
            other => other,
        });
    }

    state.failed_login_repository.clear(&user.email).await?;
    let tokens = start_session(&state, &user, &client).await?;
    info!("User {} completed two-factor login", user.id);

    Ok(Json(json!({
        "message": "Login successful",
        "user": UserView::from(&user),
        "access_token": tokens.access_token,
        "refresh_token": tokens.refresh_token,
        "token_type": tokens.token_type,
        "expires_in": tokens.expires_in,
        "used_backup_code": used_backup_code,
    })))
}

/// Refresh token endpoint, rotating the refresh token
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> AuthResult<Json<jwt::TokenPair>> {
    let claims = state
        .jwt_service
        .validate_refresh_token(&payload.refresh_token)
        .map_err(|_| AuthError::unauthorized("Invalid refresh token"))?;

    let user = state
        .user_repository
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| AuthError::unauthorized("Invalid refresh token"))?;
    if user.disabled {
        return Err(AuthError::forbidden("Account is disabled"));
    }

    let tokens = state.jwt_service.issue_pair(&user, claims.sid)?;
    let lifetime = i64::try_from(state.jwt_service.refresh_token_expiry()).unwrap_or(i64::MAX);

    let rotation = state
        .session_repository
        .rotate(
            claims.sid,
            &token_fingerprint(&payload.refresh_token),
            &token_fingerprint(&tokens.refresh_token),
            Utc::now() + Duration::seconds(lifetime),
        )
        .await?;

    match rotation {
        Rotation::Rotated => Ok(Json(tokens)),
        Rotation::Inactive => Err(AuthError::unauthorized("Session expired or revoked")),
        Rotation::Reused => Err(AuthError::unauthorized(
            "Refresh token has already been used; the session was revoked",
        )),
    }
}

/// Logout endpoint
pub async fn logout(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> AuthResult<Json<serde_json::Value>> {
    let remaining = current.claims.remaining_lifetime(jwt::now_secs()?);
    token::blacklist(&state.redis_pool, &current.access_token, remaining).await?;
    state
        .session_repository
        .revoke(current.user.id, current.claims.sid)
        .await?;

    info!("User {} logged out", current.user.id);
    Ok(Json(json!({ "message": "Logged out successfully" })))
}

/// Start a password reset
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> AuthResult<Json<serde_json::Value>> {
    let email = normalize_email(&payload.email);

    match state.user_repository.find_by_email(&email).await? {
        Some(user) if !user.disabled => {
            send_code_quietly(&state, &user, CodePurpose::PasswordReset).await;
        }
        _ => info!("Password reset requested for an unknown or disabled account"),
    }

    Ok(Json(json!({ "message": GENERIC_CODE_SENT })))
}

/// Finish a password reset with the emailed code
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> AuthResult<Json<serde_json::Value>> {
    let email = normalize_email(&payload.email);
    // A rejected password must not spend an attempt on the code
    check_new_password(&state, &payload.new_password).await?;
    check_code(&state, &email, CodePurpose::PasswordReset, &payload.code).await?;

    let user = state
        .user_repository
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AuthError::bad_request("Invalid or expired verification code"))?;

    super::profile::ensure_not_recent(&state, &user, &payload.new_password).await?;

    state
        .user_repository
        .update_password(user.id, &password::hash_password(&payload.new_password)?)
        .await?;
    state
        .verification_repository
        .clear(&email, CodePurpose::PasswordReset)
        .await?;
    state.session_repository.revoke_all(user.id).await?;
    state.failed_login_repository.clear(&email).await?;

    info!("Password reset for user {}", user.id);
    Ok(Json(json!({
        "message": "Password reset successfully. Please log in with your new password"
    })))
}
