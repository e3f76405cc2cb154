//! Hotel model, its public view and the list query

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::pricing::{self, AvailabilityStatus, DynamicPrice};

pub const PROPERTY_TYPES: [&str; 5] = ["hotel", "apartment", "villa", "resort", "boutique"];

/// Hotel entity
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Hotel {
    pub id: Uuid,
    pub name: String,
    pub location: String,
    pub description: String,
    pub base_price: Decimal,
    pub price_per_night: Decimal,
    pub discount_percent: i32,
    pub original_price: Option<Decimal>,
    pub total_rooms: i32,
    pub available_rooms: i32,
    pub last_booked_at: Option<DateTime<Utc>>,
    pub current_viewers: i32,
    pub booking_count_24h: i32,
    pub rating: Decimal,
    pub review_count: i32,
    pub amenities: Vec<String>,
    pub images: Vec<String>,
    pub property_type: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub price_drop_24h: Decimal,
    pub price_trend: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Hotel {
    pub fn availability(&self) -> AvailabilityStatus {
        AvailabilityStatus::from_rooms(self.available_rooms, self.total_rooms)
    }

    /// Rate the current rooms and recent bookings call for
    pub fn dynamic_price(&self) -> DynamicPrice {
        pricing::dynamic_price(
            self.base_price,
            self.total_rooms,
            self.available_rooms,
            self.booking_count_24h,
        )
    }

    /// Whether the hotel already shows `price`
    pub fn shows(&self, price: &DynamicPrice) -> bool {
        self.price_per_night == price.price
            && self.discount_percent == price.discount_percent
            && self.original_price == price.original_price
    }
}

/// Hotel plus the flags derived from its live figures
#[derive(Debug, Clone, Serialize)]
pub struct HotelView {
    #[serde(flatten)]
    pub hotel: Hotel,
    pub availability_status: AvailabilityStatus,
    pub is_limited_availability: bool,
    pub is_popular: bool,
}

impl From<Hotel> for HotelView {
    fn from(hotel: Hotel) -> Self {
        let status = hotel.availability();
        Self {
            availability_status: status,
            is_limited_availability: status.is_limited(),
            is_popular: pricing::is_popular(hotel.booking_count_24h),
            hotel,
        }
    }
}

/// Admin payload for creating a hotel
#[derive(Debug, Clone, Deserialize)]
pub struct CreateHotelRequest {
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub description: String,
    pub base_price: Decimal,
    pub total_rooms: i32,
    pub available_rooms: Option<i32>,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    pub property_type: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

impl CreateHotelRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Hotel name is required".to_string());
        }
        if self.location.trim().is_empty() {
            return Err("Location is required".to_string());
        }
        if self.base_price <= Decimal::ZERO {
            return Err("Base price must be positive".to_string());
        }
        if self.total_rooms < 1 {
            return Err("A hotel needs at least one room".to_string());
        }
        if let Some(available) = self.available_rooms {
            if available < 0 || available > self.total_rooms {
                return Err("Available rooms must be between 0 and total rooms".to_string());
            }
        }
        validate_property_type(self.property_type.as_deref())
    }
}

/// Admin payload for a partial hotel update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateHotelRequest {
    pub name: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub base_price: Option<Decimal>,
    pub total_rooms: Option<i32>,
    pub available_rooms: Option<i32>,
    pub amenities: Option<Vec<String>>,
    pub images: Option<Vec<String>>,
    pub property_type: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

impl UpdateHotelRequest {
    /// Check the update against the hotel it will be applied to
    pub fn validate(&self, current: &Hotel) -> Result<(), String> {
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err("Hotel name cannot be empty".to_string());
        }
        if self.base_price.is_some_and(|p| p <= Decimal::ZERO) {
            return Err("Base price must be positive".to_string());
        }
        let total = self.total_rooms.unwrap_or(current.total_rooms);
        let available = self.available_rooms.unwrap_or(current.available_rooms);
        if total < 1 {
            return Err("A hotel needs at least one room".to_string());
        }
        if available < 0 || available > total {
            return Err("Available rooms must be between 0 and total rooms".to_string());
        }
        validate_property_type(self.property_type.as_deref())
    }

    /// Whether the update moves any figure that feeds dynamic pricing
    pub fn affects_pricing(&self) -> bool {
        self.base_price.is_some() || self.total_rooms.is_some() || self.available_rooms.is_some()
    }
}

fn validate_property_type(property_type: Option<&str>) -> Result<(), String> {
    match property_type {
        Some(kind) if !PROPERTY_TYPES.contains(&kind) => {
            Err(format!("Property type must be one of: {}", PROPERTY_TYPES.join(", ")))
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HotelSort {
    #[default]
    Recommended,
    PriceAsc,
    PriceDesc,
    Rating,
    Popular,
    Discount,
}

impl HotelSort {
    pub fn order_by(&self) -> &'static str {
        match self {
            HotelSort::Recommended => "rating DESC, review_count DESC, created_at DESC",
            HotelSort::PriceAsc => "price_per_night ASC",
            HotelSort::PriceDesc => "price_per_night DESC",
            HotelSort::Rating => "rating DESC, review_count DESC",
            HotelSort::Popular => "booking_count_24h DESC, rating DESC",
            HotelSort::Discount => "discount_percent DESC, price_per_night ASC",
        }
    }
}

/// Query parameters of the hotel list
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HotelQuery {
    pub location: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub min_rating: Option<Decimal>,
    /// Comma separated; a hotel must offer all of them
    pub amenities: Option<String>,
    pub property_type: Option<String>,
    pub availability_status: Option<String>,
    #[serde(default)]
    pub sort: HotelSort,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl HotelQuery {
    pub fn amenity_list(&self) -> Vec<String> {
        self.amenities
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(20).clamp(1, 100)
    }
}

/// One recorded price change
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PriceHistoryEntry {
    pub id: Uuid,
    pub hotel_id: Uuid,
    pub base_price: Decimal,
    pub price: Decimal,
    pub discount_percent: i32,
    pub demand_multiplier: Decimal,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

/// Price history shown with a hotel unless asked otherwise
pub const DEFAULT_HISTORY_DAYS: i64 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct PriceHistoryQuery {
    pub days: Option<i64>,
}

impl PriceHistoryQuery {
    pub fn days(&self) -> i64 {
        self.days.unwrap_or(DEFAULT_HISTORY_DAYS).clamp(1, 365)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hotel() -> Hotel {
        Hotel {
            id: Uuid::new_v4(),
            name: "Sea Breeze".to_string(),
            location: "Lisbon, Portugal".to_string(),
            description: String::new(),
            base_price: Decimal::from(120),
            price_per_night: Decimal::from(120),
            discount_percent: 0,
            original_price: None,
            total_rooms: 40,
            available_rooms: 3,
            last_booked_at: None,
            current_viewers: 0,
            booking_count_24h: 7,
            rating: Decimal::new(87, 1),
            review_count: 12,
            amenities: vec!["wifi".to_string(), "pool".to_string()],
            images: vec![],
            property_type: "hotel".to_string(),
            latitude: None,
            longitude: None,
            address: None,
            city: Some("Lisbon".to_string()),
            country: Some("Portugal".to_string()),
            price_drop_24h: Decimal::ZERO,
            price_trend: "stable".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_view_derives_flags() {
        let view = HotelView::from(sample_hotel());
        assert_eq!(view.availability_status, AvailabilityStatus::AlmostFull);
        assert!(view.is_limited_availability);
        assert!(view.is_popular);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["availability_status"], "almost_full");
        assert_eq!(json["name"], "Sea Breeze");
    }

    #[test]
    fn test_amenity_list_parsing() {
        let query = HotelQuery {
            amenities: Some("wifi, pool,,spa ".to_string()),
            ..Default::default()
        };
        assert_eq!(query.amenity_list(), vec!["wifi", "pool", "spa"]);
        assert!(HotelQuery::default().amenity_list().is_empty());
    }

    #[test]
    fn test_pagination_bounds() {
        let query = HotelQuery {
            page: Some(0),
            limit: Some(500),
            ..Default::default()
        };
        assert_eq!(query.page(), 1);
        assert_eq!(query.limit(), 100);
        assert_eq!(HotelQuery::default().limit(), 20);
    }

    #[test]
    fn test_create_validation() {
        let mut request = CreateHotelRequest {
            name: "Villa Sol".to_string(),
            location: "Ibiza".to_string(),
            description: String::new(),
            base_price: Decimal::from(300),
            total_rooms: 8,
            available_rooms: Some(9),
            amenities: vec![],
            images: vec![],
            property_type: Some("villa".to_string()),
            latitude: None,
            longitude: None,
            address: None,
            city: None,
            country: None,
        };
        assert!(request.validate().is_err());

        request.available_rooms = None;
        assert!(request.validate().is_ok());

        request.property_type = Some("castle".to_string());
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_update_validation_uses_current_rooms() {
        let hotel = sample_hotel();
        let update = UpdateHotelRequest {
            total_rooms: Some(2),
            ..Default::default()
        };
        // 3 rooms available would exceed the new total
        assert!(update.validate(&hotel).is_err());
        assert!(update.affects_pricing());

        let rename = UpdateHotelRequest {
            name: Some("Sea Breeze Resort".to_string()),
            ..Default::default()
        };
        assert!(rename.validate(&hotel).is_ok());
        assert!(!rename.affects_pricing());
    }

    #[test]
    fn test_sort_parsing() {
        let sort: HotelSort = serde_json::from_str("\"price_desc\"").unwrap();
        assert_eq!(sort, HotelSort::PriceDesc);
        assert_eq!(sort.order_by(), "price_per_night DESC");
    }
}
