//! Authentication service routes

use std::{convert::Infallible, net::SocketAddr};

use axum::{
    Json, Router, async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{header::USER_AGENT, request::Parts},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    AppState,
    codes,
    error::{AuthError, AuthResult},
    jwt::{TokenPair, token_fingerprint},
    middleware::{auth_middleware, rate_limit_middleware},
    models::{CodePurpose, NewSession, User, UserView},
};

mod account;
mod profile;
mod recovery;
mod sessions;
mod two_factor;

/// Where a request came from, recorded on sessions and failed logins
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientContext {
    pub fn ip_or_unknown(&self) -> &str {
        self.ip.as_deref().unwrap_or("unknown")
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        Ok(Self { ip, user_agent })
    }
}

/// Tokens plus the user they were issued to
#[derive(Serialize)]
pub struct AuthResponse {
    pub message: &'static str,
    pub user: UserView,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let limited = Router::new()
        .route("/register", post(account::register))
        .route("/verify-email", post(account::verify_email))
        .route("/resend-code", post(account::resend_code))
        .route("/login", post(account::login))
        .route("/verify-2fa-login", post(account::verify_two_factor_login))
        .route("/forgot-password", post(account::forgot_password))
        .route("/reset-password", post(account::reset_password))
        .route("/request-unlock", post(recovery::request_unlock))
        .route("/verify-unlock", post(recovery::verify_unlock))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    let open = Router::new().route("/refresh", post(account::refresh));

    let protected = Router::new()
        .route("/logout", post(account::logout))
        .route("/profile", get(profile::get_profile))
        .route("/update-display-name", put(profile::update_display_name))
        .route("/change-password", post(profile::change_password))
        .route("/disable-account", post(profile::disable_account))
        .route("/delete-account", delete(profile::delete_account))
        .route("/request-email-change", post(recovery::request_email_change))
        .route("/verify-email-change", post(recovery::verify_email_change))
        .route("/enable-2fa", post(two_factor::enable))
        .route("/verify-2fa-setup", post(two_factor::verify_setup))
        .route("/backup-codes", get(two_factor::backup_code_status))
        .route("/regenerate-backup-codes", post(two_factor::regenerate_backup_codes))
        .route("/disable-2fa", post(two_factor::disable))
        .route("/sessions", get(sessions::list))
        .route("/sessions/revoke-others", post(sessions::revoke_others))
        .route("/sessions/:id", delete(sessions::revoke))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", limited.merge(open).merge(protected))
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "auth-service"
    }))
}

/// Open a new session for `user` and mint its first token pair
pub(crate) async fn start_session(
    state: &AppState,
    user: &User,
    client: &ClientContext,
) -> AuthResult<TokenPair> {
    let session_id = Uuid::new_v4();
    let tokens = state.jwt_service.issue_pair(user, session_id)?;
    let lifetime = i64::try_from(state.jwt_service.refresh_token_expiry()).unwrap_or(i64::MAX);

    state
        .session_repository
        .create(&NewSession {
            id: session_id,
            user_id: user.id,
            token_hash: token_fingerprint(&tokens.refresh_token),
            ip_address: client.ip.clone(),
            user_agent: client.user_agent.clone(),
            expires_at: Utc::now() + Duration::seconds(lifetime),
        })
        .await?;

    Ok(tokens)
}

const INVALID_CODE: &str = "Invalid or expired verification code";

/// Check a one-time code, spending one of its attempts
pub(crate) async fn check_code(
    state: &AppState,
    email: &str,
    purpose: CodePurpose,
    code: &str,
) -> AuthResult<()> {
    let stored = state
        .verification_repository
        .latest(email, purpose)
        .await?
        .ok_or_else(|| AuthError::bad_request(INVALID_CODE))?;

    let Some(count) = state.verification_repository.consume_attempt(stored.id).await? else {
        return Err(AuthError::bad_request(
            "Too many failed attempts. Please request a new code",
        ));
    };

    if !codes::code_matches(code, &stored.code_hash) {
        return Err(AuthError::bad_request(format!(
            "Invalid verification code. {} attempts remaining",
            count.remaining()
        )));
    }

    Ok(())
}

/// Generate, store and email a fresh code to `email`
pub(crate) async fn send_code(
    state: &AppState,
    email: &str,
    name: &str,
    purpose: CodePurpose,
) -> AuthResult<()> {
    let code = codes::generate_verification_code();
    state
        .verification_repository
        .issue(
            email,
            purpose,
            &codes::hash_code(&code),
            Utc::now() + purpose.lifetime(),
        )
        .await?;
    state.mailer.send_code(email, name, &code, purpose).await?;
    Ok(())
}

/// Send a code where the reply must not reveal whether the account exists
pub(crate) async fn send_code_quietly(state: &AppState, user: &User, purpose: CodePurpose) {
    if let Err(err) = send_code(state, &user.email, &user.name, purpose).await {
        warn!("Could not deliver {} code to user {}: {}", purpose.as_str(), user.id, err);
    }
}

/// Verify the caller's password before a sensitive account change
pub(crate) fn confirm_password(user: &User, password: &str) -> AuthResult<()> {
    if crate::password::verify_password(password, &user.password_hash)? {
        Ok(())
    } else {
        Err(AuthError::unauthorized("Incorrect password"))
    }
}

/// Reject passwords that fail the strength rules or appear in a breach
pub(crate) async fn check_new_password(state: &AppState, password: &str) -> AuthResult<()> {
    crate::validation::validate_password(password).map_err(AuthError::invalid_password)?;

    if state.breach_checker.is_compromised(password).await {
        return Err(AuthError::bad_request(
            "This password has appeared in a data breach. Please choose a different password",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn test_client_context_reads_connect_info_and_user_agent() {
        let mut req = Request::builder()
            .header(USER_AGENT, "Mozilla/5.0")
            .body(())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 7], 4242))));
        let (mut parts, _) = req.into_parts();

        let client = ClientContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(client.ip.as_deref(), Some("192.168.1.7"));
        assert_eq!(client.user_agent.as_deref(), Some("Mozilla/5.0"));
    }

    #[tokio::test]
    async fn test_client_context_without_connect_info() {
        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();

        let client = ClientContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(client.ip_or_unknown(), "unknown");
        assert!(client.user_agent.is_none());
    }
}
