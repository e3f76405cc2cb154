//! Hotel service models

pub mod booking;
pub mod hotel;
pub mod loyalty;
pub mod personalization;
pub mod review;
pub mod trip;

// Re-export for convenience
pub use booking::{Booking, BookingStatus, NewBooking, Payment, PaymentMethod};
pub use hotel::{Hotel, HotelView, PriceHistoryEntry};
pub use loyalty::{LoyaltyProfile, PointsKind, ProfileView};
pub use personalization::{PriceAlert, PriceAlertView, UserPreferences, WishlistItem};
pub use review::{Review, ReviewStats};
