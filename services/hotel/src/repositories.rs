//! Repositories for database operations

pub mod booking;
pub mod hotel;
pub mod loyalty;
pub mod personalization;
pub mod review;
pub mod trip;

pub use booking::BookingRepository;
pub use hotel::HotelRepository;
pub use loyalty::LoyaltyRepository;
pub use personalization::PersonalizationRepository;
pub use review::ReviewRepository;
pub use trip::TripRepository;
