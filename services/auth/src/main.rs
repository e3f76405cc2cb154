use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use tracing::{info, warn};

use auth::{
    AppState, MIGRATOR,
    jwt::{JwtConfig, JwtService},
    lockout::LockoutPolicy,
    mailer::{LogMailer, Mailer, SmtpConfig, SmtpMailer},
    password::BreachChecker,
    rate_limiter::{RateLimiter, RateLimiterConfig},
    repositories::{
        BackupCodeRepository, FailedLoginRepository, SessionRepository, UserRepository,
        VerificationRepository,
    },
    routes,
};
use common::{
    cache::{RedisConfig, RedisPool},
    database::{self, DatabaseConfig},
    settings::ServiceSettings,
    telemetry,
};

/// SMTP delivery unless the log mailer was explicitly requested
fn build_mailer(settings: &ServiceSettings) -> Result<Arc<dyn Mailer>> {
    if settings.log_mailer {
        warn!("Log mailer enabled; account emails will not be delivered");
        return Ok(Arc::new(LogMailer));
    }
    let mailer = SmtpMailer::new(&SmtpConfig::from_env()?)?;
    Ok(Arc::new(mailer))
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    info!("Starting authentication service");

    let settings = ServiceSettings::load(3000)?;

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = database::init_pool(&db_config).await?;

    // Check database connectivity
    if database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }
    database::run_migrations(&pool, &MIGRATOR).await?;

    let jwt_service = JwtService::new(JwtConfig::from_env()?)?;

    // Initialize Redis connection pool
    let redis_pool = RedisPool::new(&RedisConfig::from_env()?).await?;

    if !settings.breach_check {
        info!("Pwned Passwords checks are disabled");
    }

    let app_state = AppState {
        redis_pool,
        jwt_service,
        user_repository: UserRepository::new(pool.clone()),
        session_repository: SessionRepository::new(pool.clone()),
        verification_repository: VerificationRepository::new(pool.clone()),
        failed_login_repository: FailedLoginRepository::new(pool.clone()),
        backup_code_repository: BackupCodeRepository::new(pool),
        rate_limiter: RateLimiter::new(RateLimiterConfig::default()),
        lockout: LockoutPolicy::default(),
        breach_checker: BreachChecker::new(settings.breach_check)?,
        mailer: build_mailer(&settings)?,
    };

    info!("Authentication service initialized successfully");

    // Start the web server
    let app = routes::create_router(app_state);

    let address = settings.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Authentication service listening on {}", address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
