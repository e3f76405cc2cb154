//! Error type returned by every auth handler

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::mailer::MailError;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{message}")]
    Validation {
        message: String,
        errors: Vec<String>,
    },

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Account temporarily locked due to too many failed login attempts")]
    Locked { remaining_minutes: i64 },

    #[error("Too many requests, please try again later")]
    RateLimited,

    #[error("Internal server error")]
    Internal,
}

impl AuthError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        AuthError::Unauthorized(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        AuthError::BadRequest(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AuthError::Forbidden(message.into())
    }

    pub fn invalid_password(errors: Vec<String>) -> Self {
        AuthError::Validation {
            message: "Password does not meet requirements".to_string(),
            errors,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation { .. } | AuthError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AuthError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::Conflict(_) => StatusCode::CONFLICT,
            AuthError::Locked { .. } | AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        error!("Internal error: {:#}", err);
        AuthError::Internal
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        error!("Database error: {}", err);
        AuthError::Internal
    }
}

impl From<MailError> for AuthError {
    fn from(err: MailError) -> Self {
        error!("Email delivery failed: {}", err);
        AuthError::Internal
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AuthError::Validation { message, errors } => json!({
                "error": message,
                "errors": errors,
            }),
            AuthError::Locked { remaining_minutes } => json!({
                "error": self.to_string(),
                "locked": true,
                "remaining_minutes": remaining_minutes,
            }),
            other => json!({ "error": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AuthError::bad_request("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(AuthError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AuthError::Locked { remaining_minutes: 3 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(AuthError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            AuthError::from(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_errors_are_not_leaked() {
        let err = AuthError::from(anyhow::anyhow!("connection refused at 10.0.0.5"));
        assert_eq!(err.to_string(), "Internal server error");
    }

    #[test]
    fn test_mail_failures_hide_the_recipient() {
        let err = AuthError::from(MailError::InvalidAddress("guest@internal".to_string()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Internal server error");
    }

    #[test]
    fn test_validation_response_is_bad_request() {
        let response =
            AuthError::invalid_password(vec!["too short".to_string()]).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
