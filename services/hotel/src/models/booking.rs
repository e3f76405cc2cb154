//! Booking and payment models

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::pricing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "cancelled" => Some(BookingStatus::Cancelled),
            "completed" => Some(BookingStatus::Completed),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Completed)
        )
    }
}

/// Booking entity
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub hotel_id: Uuid,
    pub user_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub nights: i32,
    pub rooms: i32,
    pub guests: i32,
    pub travel_type: Option<String>,
    pub guest_name: String,
    pub guest_email: String,
    pub guest_phone: Option<String>,
    pub special_requests: Option<String>,
    pub price_per_night: Decimal,
    pub subtotal: Decimal,
    pub taxes: Decimal,
    pub fees: Decimal,
    pub points_redeemed: i64,
    pub points_discount: Decimal,
    pub savings: Decimal,
    pub total_price: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Booking {
    pub fn status(&self) -> Option<BookingStatus> {
        BookingStatus::parse(&self.status)
    }
}

/// Everything needed to write a confirmed booking and its payment
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub hotel_id: Uuid,
    pub user_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub rooms: i32,
    pub guests: i32,
    pub travel_type: Option<String>,
    pub guest_name: String,
    pub guest_email: String,
    pub guest_phone: Option<String>,
    pub special_requests: Option<String>,
    pub quote: pricing::Quote,
    /// Deal discount on the nightly rate plus the value of redeemed points
    pub savings: Decimal,
    pub payment_method: PaymentMethod,
    pub card_last4: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteRequest {
    pub hotel_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    #[serde(default = "one")]
    pub rooms: i32,
    #[serde(default)]
    pub points_to_redeem: i64,
}

fn one() -> i32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Card,
    Paypal,
    Points,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::Points => "points",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingRequest {
    pub hotel_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    #[serde(default = "one")]
    pub rooms: i32,
    #[serde(default = "one")]
    pub guests: i32,
    pub travel_type: Option<String>,
    pub guest_name: String,
    pub guest_email: String,
    pub guest_phone: Option<String>,
    pub special_requests: Option<String>,
    #[serde(default)]
    pub points_to_redeem: i64,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    /// Only the last four digits are kept
    pub card_number: Option<String>,
}

/// Travel purposes a booking may be tagged with
pub const TRAVEL_TYPES: [&str; 5] = ["solo", "couple", "family", "business", "friends"];

fn is_valid_email(email: &str) -> bool {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });
    email.len() <= 254 && regex.is_match(email)
}

/// Check stay dates and return the number of nights
pub fn validate_stay(check_in: NaiveDate, check_out: NaiveDate, today: NaiveDate) -> Result<i64, String> {
    if check_in < today {
        return Err("Check-in date cannot be in the past".to_string());
    }
    pricing::nights(check_in, check_out)
        .ok_or_else(|| "Check-out must be at least one night after check-in".to_string())
}

impl CreateBookingRequest {
    /// Validate the request and return the number of nights
    pub fn validate(&self, today: NaiveDate) -> Result<i64, String> {
        let nights = validate_stay(self.check_in, self.check_out, today)?;

        if self.rooms < 1 {
            return Err("At least one room is required".to_string());
        }
        if self.guests < 1 {
            return Err("At least one guest is required".to_string());
        }
        if self.guest_name.trim().chars().count() < 2 {
            return Err("Guest name is required".to_string());
        }
        if !is_valid_email(self.guest_email.trim()) {
            return Err("A valid guest email is required".to_string());
        }
        if self.points_to_redeem < 0 {
            return Err("Points to redeem cannot be negative".to_string());
        }
        if let Some(kind) = self.travel_type.as_deref() {
            if !TRAVEL_TYPES.contains(&kind) {
                return Err(format!("Travel type must be one of: {}", TRAVEL_TYPES.join(", ")));
            }
        }
        if self.payment_method == PaymentMethod::Card && self.card_last4().is_none() {
            return Err("A card number is required for card payments".to_string());
        }

        Ok(nights)
    }

    /// Last four digits of the card, when a plausible card number was sent
    pub fn card_last4(&self) -> Option<String> {
        let digits: String = self
            .card_number
            .as_deref()?
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();
        if digits.len() < 12 || digits.len() > 19 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some(digits[digits.len() - 4..].to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: BookingStatus,
}

/// Payment entity
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub method: String,
    pub card_last4: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub refunded_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 7, day).unwrap()
    }

    fn request() -> CreateBookingRequest {
        CreateBookingRequest {
            hotel_id: Uuid::new_v4(),
            check_in: date(10),
            check_out: date(13),
            rooms: 1,
            guests: 2,
            travel_type: Some("couple".to_string()),
            guest_name: "Ana Costa".to_string(),
            guest_email: "ana@example.com".to_string(),
            guest_phone: None,
            special_requests: None,
            points_to_redeem: 0,
            payment_method: PaymentMethod::Card,
            card_number: Some("4242 4242 4242 4242".to_string()),
        }
    }

    #[test]
    fn test_valid_request_returns_nights() {
        assert_eq!(request().validate(date(1)), Ok(3));
    }

    #[test]
    fn test_dates_are_checked() {
        let mut past = request();
        past.check_in = date(1);
        assert!(past.validate(date(2)).is_err());

        let mut same_day = request();
        same_day.check_out = same_day.check_in;
        assert!(same_day.validate(date(1)).is_err());
    }

    #[test]
    fn test_guest_details_are_checked() {
        let mut no_name = request();
        no_name.guest_name = " ".to_string();
        assert!(no_name.validate(date(1)).is_err());

        let mut bad_email = request();
        bad_email.guest_email = "ana@".to_string();
        assert!(bad_email.validate(date(1)).is_err());

        let mut no_rooms = request();
        no_rooms.rooms = 0;
        assert!(no_rooms.validate(date(1)).is_err());
    }

    #[test]
    fn test_card_number_reduced_to_last_four() {
        assert_eq!(request().card_last4().as_deref(), Some("4242"));

        let mut short = request();
        short.card_number = Some("1234".to_string());
        assert_eq!(short.card_last4(), None);
        assert!(short.validate(date(1)).is_err());

        let mut paypal = request();
        paypal.payment_method = PaymentMethod::Paypal;
        paypal.card_number = None;
        assert!(paypal.validate(date(1)).is_ok());
    }

    #[test]
    fn test_status_transitions() {
        use BookingStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Completed));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Confirmed.can_transition_to(Confirmed));
    }

    #[test]
    fn test_status_parse_round_trip() {
        for status in [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Cancelled,
            BookingStatus::Completed,
        ] {
            assert_eq!(BookingStatus::parse(status.as_str()), Some(status));
        }
    }
}
