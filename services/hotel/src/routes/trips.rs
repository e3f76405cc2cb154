//! Trip catalogue and seat booking handlers

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    middleware::AuthUser,
    models::trip::{
        Trip, TripBooking, TripBookingRequest, TripBookingStatus, TripQuery, TripRequest,
        TripStatusRequest,
    },
    repositories::trip::{SeatReservation, TripUpdate},
    state::AppState,
};

async fn find_trip(state: &AppState, id: Uuid) -> ApiResult<Trip> {
    state
        .trip_repository
        .find(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Trip not found"))
}

async fn find_visible_booking(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> ApiResult<TripBooking> {
    let booking = state
        .trip_repository
        .find_booking(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Trip booking not found"))?;

    if booking.user_id != user.id && !user.is_admin {
        warn!("User {} attempted to access trip booking {}", user.id, id);
        return Err(ApiError::forbidden("You can only access your own bookings"));
    }
    Ok(booking)
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<TripQuery>,
) -> ApiResult<Json<Value>> {
    let trips = state.trip_repository.list(&query).await?;
    Ok(Json(json!({ "total": trips.len(), "trips": trips })))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Trip>> {
    Ok(Json(find_trip(&state, id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<TripRequest>,
) -> ApiResult<(StatusCode, Json<Trip>)> {
    payload.validate().map_err(ApiError::BadRequest)?;
    let trip = state.trip_repository.create(&payload).await?;
    Ok((StatusCode::CREATED, Json(trip)))
}

/// Replace a trip's details; seats already sold stay sold
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TripRequest>,
) -> ApiResult<Json<Trip>> {
    payload.validate().map_err(ApiError::BadRequest)?;

    match state.trip_repository.update(id, &payload).await? {
        TripUpdate::Updated(trip) => Ok(Json(trip)),
        TripUpdate::NotFound => Err(ApiError::not_found("Trip not found")),
        TripUpdate::SeatsBelowBooked => Err(ApiError::conflict(
            "Seats cannot drop below the seats already booked",
        )),
    }
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    if !state.trip_repository.delete(id).await? {
        return Err(ApiError::not_found("Trip not found"));
    }

    info!("Trip {} deleted by admin {}", id, admin.id);
    Ok(Json(json!({ "message": "Trip deleted" })))
}

/// Hold seats on a trip; the booking starts out pending
pub async fn book(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<TripBookingRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    payload.validate().map_err(ApiError::BadRequest)?;

    match state
        .trip_repository
        .book(user.id, payload.trip_id, payload.seats)
        .await?
    {
        SeatReservation::Booked { booking, trip } => Ok((
            StatusCode::CREATED,
            Json(json!({
                "booking": booking,
                "trip": trip,
            })),
        )),
        SeatReservation::UnknownTrip => Err(ApiError::not_found("Trip not found")),
        SeatReservation::NoSeats => Err(ApiError::conflict("Not enough seats available")),
    }
}

/// The caller's trip bookings, newest first
pub async fn my_bookings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Value>> {
    let bookings = state.trip_repository.bookings_for_user(user.id).await?;
    Ok(Json(json!({ "bookings": bookings })))
}

pub async fn get_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TripBooking>> {
    Ok(Json(find_visible_booking(&state, &user, id).await?))
}

/// Move a trip booking along its lifecycle.
///
/// Travellers may cancel their own bookings; confirming is left to
/// administrators.
pub async fn update_booking_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TripStatusRequest>,
) -> ApiResult<Json<TripBooking>> {
    let booking = find_visible_booking(&state, &user, id).await?;
    let current = booking
        .status()
        .ok_or_else(|| ApiError::bad_request("Trip booking has an unknown status"))?;
    let next = payload.status;

    if !current.can_transition_to(next) {
        return Err(ApiError::bad_request(format!(
            "Cannot change a {} booking to {}",
            current.as_str(),
            next.as_str()
        )));
    }
    if next != TripBookingStatus::Cancelled && !user.is_admin {
        return Err(ApiError::forbidden("Only administrators can confirm bookings"));
    }

    let booking = state
        .trip_repository
        .change_booking_status(id, current, next)
        .await?
        .ok_or_else(|| ApiError::conflict("Booking status changed in the meantime"))?;

    Ok(Json(booking))
}
