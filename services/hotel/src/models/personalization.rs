//! Browsing history, wishlist, price alerts and learned preferences

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::hotel::HotelView;

/// Searches kept per user
pub const SEARCH_HISTORY_LIMIT: i64 = 50;

#[derive(Debug, Clone, Deserialize)]
pub struct TrackViewRequest {
    pub hotel_id: Uuid,
    #[serde(default)]
    pub time_spent_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackSearchRequest {
    pub destination: Option<String>,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub guests: Option<i32>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct HotelViewRecord {
    pub hotel_id: Uuid,
    pub view_count: i32,
    pub time_spent_seconds: i64,
    pub last_viewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentlyViewed {
    pub hotel: HotelView,
    pub view_count: i32,
    pub last_viewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WishlistRequest {
    pub hotel_id: Uuid,
    #[serde(default = "default_notify")]
    pub notify_on_price_drop: bool,
}

fn default_notify() -> bool {
    true
}

#[derive(Debug, Clone, FromRow)]
pub struct WishlistEntry {
    pub hotel_id: Uuid,
    pub price_when_added: Decimal,
    pub notify_on_price_drop: bool,
    pub added_at: DateTime<Utc>,
}

/// Wishlist entry with the hotel's current price
#[derive(Debug, Clone, Serialize)]
pub struct WishlistItem {
    pub hotel: HotelView,
    pub price_when_added: Decimal,
    pub current_price: Decimal,
    /// How much cheaper the hotel is now; zero when it got dearer
    pub price_drop: Decimal,
    pub notify_on_price_drop: bool,
    pub added_at: DateTime<Utc>,
}

impl WishlistItem {
    pub fn new(entry: WishlistEntry, hotel: HotelView) -> Self {
        let current_price = hotel.hotel.price_per_night;
        Self {
            price_drop: (entry.price_when_added - current_price).max(Decimal::ZERO),
            current_price,
            price_when_added: entry.price_when_added,
            notify_on_price_drop: entry.notify_on_price_drop,
            added_at: entry.added_at,
            hotel,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceAlertRequest {
    pub hotel_id: Uuid,
    pub target_price: Decimal,
}

/// Price alert entity
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PriceAlert {
    pub id: Uuid,
    pub user_id: Uuid,
    pub hotel_id: Uuid,
    pub target_price: Decimal,
    pub active: bool,
    pub triggered: bool,
    pub triggered_price: Option<Decimal>,
    pub triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Alert joined with the hotel it watches
#[derive(Debug, Clone, Serialize)]
pub struct PriceAlertView {
    #[serde(flatten)]
    pub alert: PriceAlert,
    pub hotel_name: String,
    pub current_price: Decimal,
    pub target_reached: bool,
    /// Current price minus target; negative once the target is beaten
    pub difference: Decimal,
}

impl PriceAlertView {
    pub fn new(alert: PriceAlert, hotel_name: String, current_price: Decimal) -> Self {
        Self {
            target_reached: current_price <= alert.target_price,
            difference: current_price - alert.target_price,
            hotel_name,
            current_price,
            alert,
        }
    }
}

/// Preferences learned from searches and bookings
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserPreferences {
    pub user_id: Uuid,
    pub favorite_destinations: Vec<String>,
    pub preferred_amenities: Vec<String>,
    pub preferred_property_types: Vec<String>,
    pub price_min: Option<Decimal>,
    pub price_max: Option<Decimal>,
    pub total_bookings: i32,
    pub average_booking_value: Decimal,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrendingQuery {
    pub location: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

impl LimitQuery {
    pub fn limit_or(&self, default: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(target: i64) -> PriceAlert {
        PriceAlert {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            hotel_id: Uuid::new_v4(),
            target_price: Decimal::from(target),
            active: true,
            triggered: false,
            triggered_price: None,
            triggered_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_target_reached_when_price_at_or_below() {
        let view = PriceAlertView::new(alert(100), "Sea Breeze".to_string(), Decimal::from(100));
        assert!(view.target_reached);
        assert_eq!(view.difference, Decimal::ZERO);

        let view = PriceAlertView::new(alert(100), "Sea Breeze".to_string(), Decimal::from(130));
        assert!(!view.target_reached);
        assert_eq!(view.difference, Decimal::from(30));
    }

    #[test]
    fn test_limit_bounds() {
        assert_eq!(LimitQuery { limit: None }.limit_or(10), 10);
        assert_eq!(LimitQuery { limit: Some(0) }.limit_or(10), 1);
        assert_eq!(LimitQuery { limit: Some(1_000) }.limit_or(10), 100);
    }
}
