//! Database-backed tests for the auth repositories
//!
//! Every test registers its own user under a fresh address. They need
//! PostgreSQL running locally and are skipped unless requested with
//! `cargo test -- --ignored`.

use auth::{
    MIGRATOR,
    models::{CodePurpose, NewSession, NewUser, User},
    repositories::{
        EmailChange, SessionRepository, UserRepository, VerificationRepository,
        session::Rotation,
    },
};
use chrono::{Duration, Utc};
use common::database::{DatabaseConfig, init_pool, run_migrations};
use sqlx::PgPool;
use uuid::Uuid;

type TestResult = Result<(), Box<dyn std::error::Error>>;

async fn pool() -> Result<PgPool, Box<dyn std::error::Error>> {
    let pool = init_pool(&DatabaseConfig::from_env()?).await?;
    run_migrations(&pool, &MIGRATOR).await?;
    Ok(pool)
}

fn unique_email() -> String {
    format!("guest-{}@example.com", Uuid::new_v4().simple())
}

async fn register(users: &UserRepository) -> Result<User, Box<dyn std::error::Error>> {
    let user = users
        .create(&NewUser {
            email: unique_email(),
            name: "Ada Lovelace".to_string(),
            password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".to_string(),
        })
        .await?;
    Ok(user)
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL"]
async fn test_replayed_refresh_token_revokes_session() -> TestResult {
    let pool = pool().await?;
    let users = UserRepository::new(pool.clone());
    let sessions = SessionRepository::new(pool.clone());

    let user = register(&users).await?;
    let expires_at = Utc::now() + Duration::days(7);
    let session = sessions
        .create(&NewSession {
            id: Uuid::new_v4(),
            user_id: user.id,
            token_hash: "first".to_string(),
            ip_address: None,
            user_agent: None,
            expires_at,
        })
        .await?;

    assert_eq!(
        sessions.rotate(session.id, "first", "second", expires_at).await?,
        Rotation::Rotated
    );
    // The old token comes back after it was rotated away
    assert_eq!(
        sessions.rotate(session.id, "first", "third", expires_at).await?,
        Rotation::Reused
    );
    assert!(!sessions.is_active(session.id).await?);
    // Even the current token is dead once reuse was seen
    assert_eq!(
        sessions.rotate(session.id, "second", "fourth", expires_at).await?,
        Rotation::Inactive
    );
    assert_eq!(
        sessions.rotate(Uuid::new_v4(), "first", "second", expires_at).await?,
        Rotation::Inactive
    );

    users.delete(user.id).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires a running PostgreSQL"]
async fn test_concurrent_guesses_share_one_attempt_budget() -> TestResult {
    let pool = pool().await?;
    let codes = VerificationRepository::new(pool.clone());
    let email = unique_email();

    codes
        .issue(
            &email,
            CodePurpose::PasswordReset,
            "hash",
            Utc::now() + CodePurpose::PasswordReset.lifetime(),
        )
        .await?;
    let code = codes
        .latest(&email, CodePurpose::PasswordReset)
        .await?
        .ok_or("code not stored")?;

    let code_id = code.id;
    let guesses: Vec<_> = (0..12)
        .map(|_| {
            let codes = codes.clone();
            tokio::spawn(async move { codes.consume_attempt(code_id).await })
        })
        .collect();

    let mut granted = Vec::new();
    for guess in guesses {
        if let Some(count) = guess.await?? {
            granted.push(count.attempts);
        }
    }
    granted.sort_unstable();
    assert_eq!(granted, (1..=code.max_attempts).collect::<Vec<_>>());
    assert!(codes.consume_attempt(code_id).await?.is_none());

    let stored = codes
        .latest(&email, CodePurpose::PasswordReset)
        .await?
        .ok_or("code vanished")?;
    assert_eq!(stored.attempts, stored.max_attempts);

    codes.clear(&email, CodePurpose::PasswordReset).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL"]
async fn test_disabled_account_is_enabled_again() -> TestResult {
    let pool = pool().await?;
    let users = UserRepository::new(pool.clone());

    let user = register(&users).await?;
    users.disable(user.id).await?;
    let disabled = users.find_by_id(user.id).await?.ok_or("user vanished")?;
    assert!(disabled.disabled);

    let enabled = users.enable(user.id).await?.ok_or("user vanished")?;
    assert!(!enabled.disabled);
    assert!(enabled.disabled_at.is_none());
    assert!(users.enable(Uuid::new_v4()).await?.is_none());

    users.delete(user.id).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL"]
async fn test_pending_email_is_applied_once() -> TestResult {
    let pool = pool().await?;
    let users = UserRepository::new(pool.clone());

    let user = register(&users).await?;
    assert!(matches!(
        users.apply_pending_email(user.id).await?,
        EmailChange::NothingPending
    ));

    let new_email = unique_email();
    users.set_pending_email(user.id, &new_email).await?;
    match users.apply_pending_email(user.id).await? {
        EmailChange::Applied(changed) => {
            assert_eq!(changed.email, new_email);
            assert!(changed.pending_email.is_none());
        }
        other => panic!("expected the change to apply, got {other:?}"),
    }
    assert!(users.find_by_email(&user.email).await?.is_none());

    users.delete(user.id).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL"]
async fn test_pending_email_taken_meanwhile_is_refused() -> TestResult {
    let pool = pool().await?;
    let users = UserRepository::new(pool.clone());

    let user = register(&users).await?;
    let rival = register(&users).await?;

    users.set_pending_email(user.id, &rival.email).await?;
    assert!(matches!(
        users.apply_pending_email(user.id).await?,
        EmailChange::Taken
    ));
    let unchanged = users.find_by_id(user.id).await?.ok_or("user vanished")?;
    assert_eq!(unchanged.email, user.email);

    users.delete(user.id).await?;
    users.delete(rival.id).await?;
    Ok(())
}
