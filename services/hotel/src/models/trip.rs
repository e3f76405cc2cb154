//! Flights, trains and coaches sold alongside stays

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    Flight,
    Train,
    Bus,
}

impl TransportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportType::Flight => "flight",
            TransportType::Train => "train",
            TransportType::Bus => "bus",
        }
    }
}

/// A scheduled trip with seats for sale
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Trip {
    pub id: Uuid,
    pub origin: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub transport_type: String,
    pub carrier: Option<String>,
    pub price: Decimal,
    pub total_seats: i32,
    pub available_seats: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    pub fn booked_seats(&self) -> i32 {
        self.total_seats - self.available_seats
    }
}

/// Admin payload for creating a trip or replacing one
#[derive(Debug, Clone, Deserialize)]
pub struct TripRequest {
    pub origin: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub transport_type: TransportType,
    pub carrier: Option<String>,
    pub price: Decimal,
    pub seats: i32,
}

impl TripRequest {
    pub fn validate(&self) -> Result<(), String> {
        let origin = self.origin.trim();
        let destination = self.destination.trim();
        if origin.is_empty() || destination.is_empty() {
            return Err("Origin and destination are required".to_string());
        }
        if origin.eq_ignore_ascii_case(destination) {
            return Err("Origin and destination must differ".to_string());
        }
        if self.arrival_time <= self.departure_time {
            return Err("Arrival must be after departure".to_string());
        }
        if self.price <= Decimal::ZERO {
            return Err("Price must be positive".to_string());
        }
        if self.seats < 1 {
            return Err("A trip needs at least one seat".to_string());
        }
        Ok(())
    }
}

/// Query parameters of the trip list; every given filter applies
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripQuery {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub transport_type: Option<TransportType>,
    /// Departure day, UTC
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripBookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl TripBookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripBookingStatus::Pending => "pending",
            TripBookingStatus::Confirmed => "confirmed",
            TripBookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(TripBookingStatus::Pending),
            "confirmed" => Some(TripBookingStatus::Confirmed),
            "cancelled" => Some(TripBookingStatus::Cancelled),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: TripBookingStatus) -> bool {
        matches!(
            (self, next),
            (TripBookingStatus::Pending, TripBookingStatus::Confirmed)
                | (TripBookingStatus::Pending, TripBookingStatus::Cancelled)
                | (TripBookingStatus::Confirmed, TripBookingStatus::Cancelled)
        )
    }
}

/// Seats held on a trip
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TripBooking {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub user_id: Uuid,
    pub seats: i32,
    pub total_price: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TripBooking {
    pub fn status(&self) -> Option<TripBookingStatus> {
        TripBookingStatus::parse(&self.status)
    }
}

/// Most seats one booking may hold
pub const MAX_SEATS_PER_BOOKING: i32 = 9;

#[derive(Debug, Clone, Deserialize)]
pub struct TripBookingRequest {
    pub trip_id: Uuid,
    pub seats: i32,
}

impl TripBookingRequest {
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=MAX_SEATS_PER_BOOKING).contains(&self.seats) {
            return Err(format!(
                "Seats must be between 1 and {}",
                MAX_SEATS_PER_BOOKING
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TripStatusRequest {
    pub status: TripBookingStatus,
}

/// Price of `seats` seats at `price` each
pub fn trip_total(price: Decimal, seats: i32) -> Decimal {
    price * Decimal::from(seats)
}
