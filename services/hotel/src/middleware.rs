//! Authentication middleware for access tokens issued by the auth service

use axum::{
    body::Body,
    extract::State,
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
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// Authenticated user information
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub is_admin: bool,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            is_admin: claims.is_admin(),
            id: claims.sub,
            email: claims.email,
        }
    }
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) =
        bearer.ok_or_else(|| ApiError::Unauthorized("Access token required".to_string()))?;

    let claims = state.verifier.verify_access(bearer.token()).map_err(|e| {
        warn!("Rejected access token: {}", e);
        ApiError::Unauthorized("Invalid or expired token".to_string())
    })?;

    let blacklisted = token::is_blacklisted(&state.redis_pool, bearer.token())
        .await
        .map_err(|e| {
            error!("Failed to check if token is blacklisted: {}", e);
            ApiError::InternalServerError
        })?;
    if blacklisted {
        return Err(ApiError::Unauthorized("Token has been revoked".to_string()));
    }

    req.extensions_mut().insert(AuthUser::from(claims));

    Ok(next.run(req).await)
}

/// Only let administrators through; must run after [`auth_middleware`]
pub async fn admin_middleware(req: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let user = req
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| ApiError::Unauthorized("Access token required".to_string()))?;

    if !user.is_admin {
        warn!("User {} attempted an admin operation", user.id);
        return Err(ApiError::forbidden("Administrator access required"));
    }

    Ok(next.run(req).await)
}
