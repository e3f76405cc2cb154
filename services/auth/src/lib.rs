//! House of Paradise authentication service.
//!
//! Accounts, sessions and one-time codes live here as a library so the
//! binary and the database-backed tests in `tests/` share one build.

use std::sync::Arc;

use common::cache::RedisPool;
use sqlx::migrate::Migrator;

pub mod codes;
pub mod error;
pub mod jwt;
pub mod lockout;
pub mod mailer;
pub mod middleware;
pub mod models;
pub mod password;
pub mod rate_limiter;
pub mod repositories;
pub mod routes;
pub mod totp;
pub mod validation;

use crate::{
    jwt::JwtService,
    lockout::LockoutPolicy,
    mailer::Mailer,
    password::BreachChecker,
    rate_limiter::RateLimiter,
    repositories::{
        BackupCodeRepository, FailedLoginRepository, SessionRepository, UserRepository,
        VerificationRepository,
    },
};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub redis_pool: RedisPool,
    pub jwt_service: JwtService,
    pub user_repository: UserRepository,
    pub session_repository: SessionRepository,
    pub verification_repository: VerificationRepository,
    pub failed_login_repository: FailedLoginRepository,
    pub backup_code_repository: BackupCodeRepository,
    pub rate_limiter: RateLimiter,
    pub lockout: LockoutPolicy,
    pub breach_checker: BreachChecker,
    pub mailer: Arc<dyn Mailer>,
}
