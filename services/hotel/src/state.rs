//! Application state shared across handlers

use common::{cache::RedisPool, token::TokenVerifier};

use crate::{
    events::{EventBus, ViewerRegistry},
    repositories::{
        BookingRepository, HotelRepository, LoyaltyRepository, PersonalizationRepository,
        ReviewRepository, TripRepository,
    },
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub redis_pool: RedisPool,
    pub verifier: TokenVerifier,
    pub events: EventBus,
    pub viewers: ViewerRegistry,
    pub hotel_repository: HotelRepository,
    pub booking_repository: BookingRepository,
    pub review_repository: ReviewRepository,
    pub personalization_repository: PersonalizationRepository,
    pub loyalty_repository: LoyaltyRepository,
    pub trip_repository: TripRepository,
}
