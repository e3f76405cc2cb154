//! Middleware for access-token authentication and IP rate limiting

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use common::token::{self, Claims};
use tracing::{error, warn};

use crate::{AppState, error::AuthError, models::User};

/// The authenticated caller, available to handlers as an `Extension`
#[derive(Clone)]
pub struct CurrentUser {
    pub user: User,
    pub claims: Claims,
    pub access_token: String,
}

/// Validate the bearer access token and load its user
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let TypedHeader(Authorization(bearer)) =
        bearer.ok_or_else(|| AuthError::unauthorized("Access token required"))?;
    let access_token = bearer.token().to_string();

    let claims = state
        .jwt_service
        .verifier()
        .verify_access(&access_token)
        .map_err(|e| {
            warn!("Rejected access token: {}", e);
            AuthError::unauthorized("Invalid or expired token")
        })?;

    let blacklisted = token::is_blacklisted(&state.redis_pool, &access_token)
        .await
        .map_err(|e| {
            error!("Failed to check if token is blacklisted: {}", e);
            AuthError::Internal
        })?;
    if blacklisted {
        return Err(AuthError::unauthorized("Token has been revoked"));
    }

    if !state.session_repository.is_active(claims.sid).await? {
        return Err(AuthError::unauthorized("Session has been revoked"));
    }

    let user = state
        .user_repository
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| AuthError::unauthorized("User not found"))?;

    if user.disabled {
        return Err(AuthError::forbidden("Account is disabled"));
    }

    req.extensions_mut().insert(CurrentUser {
        user,
        claims,
        access_token,
    });

    Ok(next.run(req).await)
}

/// Reject callers whose IP exceeded the credential-endpoint budget
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    if !state.rate_limiter.is_allowed(&addr.ip().to_string()).await {
        return Err(AuthError::RateLimited);
    }

    Ok(next.run(req).await)
}
