//! Device session handlers

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use common::token;
use serde_json::json;
use uuid::Uuid;

use crate::{
    AppState,
    error::{AuthError, AuthResult},
    jwt,
    middleware::CurrentUser,
    models::SessionView,
};

pub async fn list(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> AuthResult<Json<serde_json::Value>> {
    let sessions: Vec<SessionView> = state
        .session_repository
        .list_active(current.user.id)
        .await?
        .iter()
        .map(|s| SessionView::from_session(s, current.claims.sid))
        .collect();

    Ok(Json(json!({ "sessions": sessions })))
}

pub async fn revoke(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(session_id): Path<Uuid>,
) -> AuthResult<Json<serde_json::Value>> {
    if !state
        .session_repository
        .revoke(current.user.id, session_id)
        .await?
    {
        return Err(AuthError::NotFound("Session not found".to_string()));
    }

    if session_id == current.claims.sid {
        let remaining = current.claims.remaining_lifetime(jwt::now_secs()?);
        token::blacklist(&state.redis_pool, &current.access_token, remaining).await?;
    }

    Ok(Json(json!({ "message": "Session revoked" })))
}

pub async fn revoke_others(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> AuthResult<Json<serde_json::Value>> {
    let revoked = state
        .session_repository
        .revoke_others(current.user.id, current.claims.sid)
        .await?;

    Ok(Json(json!({
        "message": "Other sessions revoked",
        "sessions_revoked": revoked,
    })))
}
