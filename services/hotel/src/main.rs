use anyhow::Result;
use tracing::info;

use common::{
    cache::{RedisConfig, RedisPool},
    database::{self, DatabaseConfig},
    settings::ServiceSettings,
    telemetry,
    token::TokenVerifier,
};

use hotel::{
    MIGRATOR,
    events::{EventBus, ViewerRegistry, persist_viewer_counts},
    repositories::{
        BookingRepository, HotelRepository, LoyaltyRepository, PersonalizationRepository,
        ReviewRepository, TripRepository,
    },
    routes,
    scheduler::BookingCounterReset,
    state::AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    info!("Starting hotel service");

    let settings = ServiceSettings::load(3001)?;

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = database::init_pool(&db_config).await?;

    if database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }
    database::run_migrations(&pool, &MIGRATOR).await?;

    let redis_pool = RedisPool::new(&RedisConfig::from_env()?).await?;
    let verifier = TokenVerifier::from_env()?;

    let events = EventBus::default();
    let viewers = ViewerRegistry::new(events.clone());
    tokio::spawn(persist_viewer_counts(pool.clone(), events.clone()));

    let hotel_repository = HotelRepository::new(pool.clone());

    // Dropping the scheduler stops the job
    let _scheduler = BookingCounterReset::new(hotel_repository.clone())
        .start(&settings.booking_reset_schedule)
        .await?;

    let app_state = AppState {
        redis_pool,
        verifier,
        events,
        viewers,
        hotel_repository,
        booking_repository: BookingRepository::new(pool.clone()),
        review_repository: ReviewRepository::new(pool.clone()),
        personalization_repository: PersonalizationRepository::new(pool.clone()),
        loyalty_repository: LoyaltyRepository::new(pool.clone()),
        trip_repository: TripRepository::new(pool),
    };

    info!("Hotel service initialized successfully");

    let app = routes::create_router(app_state);

    let address = settings.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Hotel service listening on {}", address);

    axum::serve(listener, app).await?;

    Ok(())
}
