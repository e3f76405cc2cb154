//! Checkout, booking and payment handlers

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use super::{best_effort, hotels};
use crate::{
    error::{ApiError, ApiResult},
    events::HotelEvent,
    middleware::AuthUser,
    models::{
        Booking, BookingStatus, Hotel, LoyaltyProfile, NewBooking, PaymentMethod,
        booking::{CreateBookingRequest, QuoteRequest, StatusUpdateRequest, validate_stay},
    },
    pricing::{self, Quote},
    repositories::booking::Reservation,
    state::AppState,
};

/// Deal discount on the nightly rate over the whole stay, plus the points discount
fn savings(hotel: &Hotel, quote: &Quote) -> Decimal {
    let deal = hotel
        .original_price
        .map(|original| {
            (original - hotel.price_per_night).max(Decimal::ZERO)
                * Decimal::from(quote.nights)
                * Decimal::from(quote.rooms)
        })
        .unwrap_or(Decimal::ZERO);
    deal + quote.points_discount
}

/// What the user's loyalty profile brings to a checkout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct LoyaltyStanding {
    available_points: i64,
    tier_discount_percent: i32,
}

impl From<Option<LoyaltyProfile>> for LoyaltyStanding {
    fn from(profile: Option<LoyaltyProfile>) -> Self {
        profile
            .map(|profile| Self {
                available_points: profile.available_points,
                tier_discount_percent: profile.tier().info().discount_percent,
            })
            .unwrap_or_default()
    }
}

/// Points and tier right now; nobody gets a profile just by asking for a quote
async fn loyalty_standing(state: &AppState, user_id: Uuid) -> ApiResult<LoyaltyStanding> {
    let profile = state.loyalty_repository.find(user_id).await?;
    Ok(LoyaltyStanding::from(profile))
}

async fn find_visible_booking(state: &AppState, user: &AuthUser, id: Uuid) -> ApiResult<Booking> {
    let booking = state
        .booking_repository
        .find(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Booking not found"))?;

    if booking.user_id != user.id && !user.is_admin {
        warn!("User {} attempted to access booking {}", user.id, id);
        return Err(ApiError::forbidden("You can only access your own bookings"));
    }
    Ok(booking)
}

/// Price a prospective booking without reserving anything
pub async fn quote(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<QuoteRequest>,
) -> ApiResult<Json<Value>> {
    let nights = validate_stay(payload.check_in, payload.check_out, Utc::now().date_naive())
        .map_err(ApiError::BadRequest)?;
    if payload.rooms < 1 {
        return Err(ApiError::bad_request("At least one room is required"));
    }
    if payload.points_to_redeem < 0 {
        return Err(ApiError::bad_request("Points to redeem cannot be negative"));
    }

    let hotel = hotels::find_hotel(&state, payload.hotel_id).await?;
    let standing = loyalty_standing(&state, user.id).await?;
    let quote = pricing::quote(
        hotel.price_per_night,
        nights,
        payload.rooms,
        payload.points_to_redeem,
        standing.available_points,
    );

    Ok(Json(json!({
        "hotel_id": hotel.id,
        "quote": quote,
        "savings": savings(&hotel, &quote),
        "available_points": standing.available_points,
        "rooms_available": hotel.available_rooms >= payload.rooms,
        "tier_discount_percent": standing.tier_discount_percent,
    })))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateBookingRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let nights = payload
        .validate(Utc::now().date_naive())
        .map_err(ApiError::BadRequest)?;

    let hotel = hotels::find_hotel(&state, payload.hotel_id).await?;
    if hotel.available_rooms < payload.rooms {
        return Err(ApiError::conflict("Not enough rooms available"));
    }

    let available = if payload.points_to_redeem > 0 {
        loyalty_standing(&state, user.id).await?.available_points
    } else {
        0
    };
    let quote = pricing::quote(
        hotel.price_per_night,
        nights,
        payload.rooms,
        payload.points_to_redeem,
        available,
    );
    if payload.payment_method == PaymentMethod::Points && quote.total > Decimal::ZERO {
        return Err(ApiError::bad_request(
            "Points only cover the booking when they pay for the full amount",
        ));
    }

    let new_booking = NewBooking {
        hotel_id: hotel.id,
        user_id: user.id,
        check_in: payload.check_in,
        check_out: payload.check_out,
        rooms: payload.rooms,
        guests: payload.guests,
        travel_type: payload.travel_type.clone(),
        guest_name: payload.guest_name.clone(),
        guest_email: payload.guest_email.clone(),
        guest_phone: payload.guest_phone.clone(),
        special_requests: payload.special_requests.clone(),
        savings: savings(&hotel, &quote),
        payment_method: payload.payment_method,
        card_last4: payload.card_last4(),
        quote,
    };

    let (booking, payment, hotel) = match state.booking_repository.create_confirmed(&new_booking).await? {
        Reservation::Created {
            booking,
            payment,
            hotel,
        } => (booking, payment, hotel),
        Reservation::NoRooms => return Err(ApiError::conflict("Not enough rooms available")),
        Reservation::InsufficientPoints => {
            return Err(ApiError::bad_request("Not enough loyalty points"));
        }
    };

    let hotel = hotels::reprice_after(&state, hotel, "booking created").await;
    state.events.publish(HotelEvent::BookingCreated {
        hotel_id: hotel.id,
        available_rooms: hotel.available_rooms,
        availability_status: hotel.availability(),
        last_booked_at: hotel.last_booked_at,
    });

    let award = best_effort(
        "award booking points",
        state
            .loyalty_repository
            .award_for_booking(user.id, booking.total_price, Some(booking.id))
            .await,
    );
    if let Some(Some(referrer)) = best_effort(
        "complete referral",
        state.loyalty_repository.complete_referral(user.id).await,
    ) {
        info!("Booking {} completed the referral by {}", booking.id, referrer);
    }
    best_effort(
        "learn booking preferences",
        state
            .personalization_repository
            .learn_from_booking(user.id, &hotel, booking.total_price)
            .await,
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Booking confirmed",
            "booking": booking,
            "payment": payment,
            "loyalty": award,
        })),
    ))
}

/// The caller's bookings, newest first
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Value>> {
    let bookings = state.booking_repository.list_for_user(user.id).await?;
    Ok(Json(json!({ "bookings": bookings })))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Booking>> {
    Ok(Json(find_visible_booking(&state, &user, id).await?))
}

/// Move a booking along its lifecycle.
///
/// Guests may cancel their own bookings; confirming and completing are
/// left to administrators.
pub async fn update_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusUpdateRequest>,
) -> ApiResult<Json<Booking>> {
    let booking = find_visible_booking(&state, &user, id).await?;
    let current = booking
        .status()
        .ok_or_else(|| ApiError::bad_request("Booking has an unknown status"))?;
    let next = payload.status;

    if !current.can_transition_to(next) {
        return Err(ApiError::bad_request(format!(
            "Cannot change a {} booking to {}",
            current.as_str(),
            next.as_str()
        )));
    }
    if next != BookingStatus::Cancelled && !user.is_admin {
        return Err(ApiError::forbidden("Only administrators can confirm or complete bookings"));
    }

    let change = state
        .booking_repository
        .change_status(id, current, next)
        .await?
        .ok_or_else(|| ApiError::conflict("Booking status changed in the meantime"))?;

    if let Some(hotel) = change.released {
        let hotel = hotels::reprice_after(&state, hotel, "booking cancelled").await;
        state.events.publish(HotelEvent::BookingCancelled {
            hotel_id: hotel.id,
            available_rooms: hotel.available_rooms,
            availability_status: hotel.availability(),
        });
    }

    Ok(Json(change.booking))
}

/// Payment record of one of the caller's bookings
pub async fn payment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(booking_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    find_visible_booking(&state, &user, booking_id).await?;
    let payment = state
        .booking_repository
        .payment_for_booking(booking_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Payment not found"))?;

    Ok(Json(json!({ "payment": payment })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hotel(price: i64, original: Option<i64>) -> Hotel {
        Hotel {
            id: Uuid::new_v4(),
            name: "Cliffside".to_string(),
            location: "Madeira".to_string(),
            description: String::new(),
            base_price: Decimal::from(original.unwrap_or(price)),
            price_per_night: Decimal::from(price),
            discount_percent: 0,
            original_price: original.map(Decimal::from),
            total_rooms: 20,
            available_rooms: 20,
            last_booked_at: None,
            current_viewers: 0,
            booking_count_24h: 0,
            rating: Decimal::ZERO,
            review_count: 0,
            amenities: vec![],
            images: vec![],
            property_type: "resort".to_string(),
            latitude: None,
            longitude: None,
            address: None,
            city: None,
            country: None,
            price_drop_24h: Decimal::ZERO,
            price_trend: "stable".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn profile(tier: &str, available_points: i64) -> LoyaltyProfile {
        LoyaltyProfile {
            user_id: Uuid::new_v4(),
            tier: tier.to_string(),
            total_points: available_points,
            available_points,
            lifetime_points: available_points,
            total_bookings: 0,
            total_spend: Decimal::ZERO,
            referral_code: "HOPTEST1".to_string(),
            referred_by: None,
            referral_rewarded: false,
            referrals_invited: 0,
            referrals_completed: 0,
            referral_points_earned: 0,
            tier_updated_at: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_loyalty_standing_from_profile() {
        assert_eq!(LoyaltyStanding::from(None), LoyaltyStanding::default());

        let standing = LoyaltyStanding::from(Some(profile("ADVENTURER", 1_250)));
        assert_eq!(standing.available_points, 1_250);
        assert_eq!(standing.tier_discount_percent, 10);
    }

    #[test]
    fn test_savings_count_deal_and_points() {
        let discounted = hotel(85, Some(100));
        let quote = pricing::quote(discounted.price_per_night, 2, 2, 1_000, 1_000);
        // 15 off for 2 nights in 2 rooms, plus 10 worth of points
        assert_eq!(savings(&discounted, &quote), Decimal::from(70));
    }

    #[test]
    fn test_no_savings_at_full_price() {
        let full = hotel(120, None);
        let quote = pricing::quote(full.price_per_night, 3, 1, 0, 5_000);
        assert_eq!(savings(&full, &quote), Decimal::ZERO);
    }
}
